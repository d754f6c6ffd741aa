//! Pre-decoded class facts, as produced by a class-file front end.
//!
//! These are the input to the indexer and the output of reading a type back
//! out of the index. Optional strings are `None` rather than empty.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassStub {
    /// Field descriptor of the class, e.g. `Ljava/util/Map$Entry;`.
    pub descriptor: String,
    pub access_flags: u32,
    pub generic_signature: Option<String>,
    pub source_file: Option<String>,
    /// Descriptor of the lexically enclosing class, for nested classes.
    pub enclosing_type: Option<String>,
    pub superclass: Option<TypeSignatureStub>,
    pub interfaces: Vec<TypeSignatureStub>,
    pub methods: Vec<MethodStub>,
    pub fields: Vec<FieldStub>,
    pub annotations: Vec<AnnotationStub>,
}

impl ClassStub {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeSignatureStub {
    /// Descriptor of the raw (erased) type.
    pub descriptor: String,
    pub dimensions: u32,
    pub arguments: Vec<TypeArgumentStub>,
}

impl TypeSignatureStub {
    pub fn raw(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wildcard {
    #[default]
    Exact,
    Extends,
    Super,
    Unbounded,
}

impl Wildcard {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            Wildcard::Exact => 0,
            Wildcard::Extends => 1,
            Wildcard::Super => 2,
            Wildcard::Unbounded => 3,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Wildcard::Exact,
            1 => Wildcard::Extends,
            2 => Wildcard::Super,
            3 => Wildcard::Unbounded,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeArgumentStub {
    pub wildcard: Wildcard,
    /// `None` only for [`Wildcard::Unbounded`].
    pub bound: Option<TypeSignatureStub>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodStub {
    pub name: String,
    pub descriptor: String,
    pub generic_signature: Option<String>,
    pub access_flags: u32,
    pub annotations: Vec<AnnotationStub>,
    /// `AnnotationDefault` of an annotation interface element.
    pub default_value: Option<ConstantValue>,
}

impl MethodStub {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldStub {
    pub name: String,
    pub descriptor: String,
    pub generic_signature: Option<String>,
    pub access_flags: u32,
    pub constant: Option<ConstantValue>,
    pub annotations: Vec<AnnotationStub>,
}

impl FieldStub {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationStub {
    /// Descriptor of the annotation interface.
    pub descriptor: String,
    pub values: Vec<AnnotationValueStub>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationValueStub {
    pub name: String,
    pub value: ConstantValue,
}

/// Literal values found in constant attributes, annotation elements and
/// annotation defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConstantValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(TypeSignatureStub),
    Enum { descriptor: String, name: String },
    Array(Vec<ConstantValue>),
    Annotation(AnnotationStub),
}
