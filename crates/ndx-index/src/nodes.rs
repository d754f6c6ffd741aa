//! Typed, read-only views of index records.
//!
//! A view borrows the heap of the transaction it was loaded under, so it can
//! never outlive the lock that makes its address valid. Equality and hashing
//! are by address within the same heap, never by content.

use std::fmt;
use std::hash::{Hash, Hasher};

use ndx_storage::{Address, Heap, NodeTag, RecordList, StorageError};

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::schema::{java_schema, tags, JavaSchema, FULLY_INDEXED};
use crate::stubs::{
    AnnotationStub, AnnotationValueStub, ClassStub, ConstantValue, FieldStub, MethodStub,
    TypeArgumentStub, TypeSignatureStub, Wildcard,
};

// Nesting bound for constants and signatures read back from the store.
pub(crate) const MAX_NESTING: usize = 64;

macro_rules! node_view {
    ($(#[$meta:meta])* $name:ident => $tag:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        pub struct $name<'t> {
            heap: &'t Heap,
            schema: &'static JavaSchema,
            address: Address,
        }

        impl<'t> $name<'t> {
            /// Loads the node at `address`, failing unless it has this kind.
            pub fn load(heap: &'t Heap, address: Address) -> Result<Self> {
                let schema = java_schema()?;
                schema.registry.load_typed(heap, address, $tag)?;
                Ok(Self {
                    heap,
                    schema,
                    address,
                })
            }

            pub fn address(&self) -> Address {
                self.address
            }
        }

        impl PartialEq for $name<'_> {
            fn eq(&self, other: &Self) -> bool {
                std::ptr::eq(self.heap, other.heap) && self.address == other.address
            }
        }

        impl Eq for $name<'_> {}

        impl Hash for $name<'_> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.address.hash(state);
            }
        }

        impl fmt::Debug for $name<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.address).finish()
            }
        }
    };
}

node_view!(
    /// One indexed artifact: a loose class file or an archive entry.
    ResourceRec => tags::RESOURCE
);
node_view!(
    /// The unique record for one type descriptor.
    TypeIdRec => tags::TYPE_ID
);
node_view!(
    /// A type declaration read from one resource.
    TypeRec => tags::TYPE
);
node_view!(MethodRec => tags::METHOD);
node_view!(FieldRec => tags::FIELD);
node_view!(SignatureRec => tags::TYPE_SIGNATURE);
node_view!(TypeArgumentRec => tags::TYPE_ARGUMENT);
node_view!(AnnotationRec => tags::ANNOTATION);
node_view!(AnnotationValueRec => tags::ANNOTATION_VALUE);
node_view!(
    /// Any of the constant kinds; see [`ConstantRec::value`].
    ConstantRec => tags::CONSTANT
);

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn load_all<'t, T>(
    heap: &'t Heap,
    list: RecordList,
    load: impl Fn(&'t Heap, Address) -> Result<T>,
) -> Result<Vec<T>> {
    list.items(heap)?
        .into_iter()
        .map(|address| load(heap, address))
        .collect()
}

fn nesting_guard(address: Address, depth: usize) -> Result<()> {
    if depth > MAX_NESTING {
        return Err(StorageError::Corruption {
            address,
            reason: "record nesting does not terminate",
        }
        .into());
    }
    Ok(())
}

impl<'t> ResourceRec<'t> {
    pub fn path(&self) -> Result<String> {
        Ok(self.schema.resource.path.get_string(self.heap, self.address)?)
    }

    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let fields = &self.schema.resource;
        Ok(Fingerprint {
            size: fields.size.get_u64(self.heap, self.address)?,
            modified_nanos: fields.modified.get_u64(self.heap, self.address)?,
            content_hash: fields.content_hash.get_u64(self.heap, self.address)?,
        })
    }

    /// Value of the store's scan counter when this resource was written.
    pub fn last_scanned(&self) -> Result<u64> {
        Ok(self.schema.resource.last_scanned.get_u64(self.heap, self.address)?)
    }

    /// `false` while indexing of this resource is incomplete or was cancelled.
    pub fn is_fully_indexed(&self) -> Result<bool> {
        let flags = self.schema.resource.flags.get_u32(self.heap, self.address)?;
        Ok(flags & FULLY_INDEXED != 0)
    }

    pub fn types(&self) -> Result<Vec<TypeRec<'t>>> {
        load_all(self.heap, self.schema.resource.types.list(self.address), TypeRec::load)
    }
}

impl<'t> TypeIdRec<'t> {
    pub fn descriptor(&self) -> Result<String> {
        Ok(self.schema.type_id.descriptor.get_string(self.heap, self.address)?)
    }

    pub fn simple_name(&self) -> Result<String> {
        Ok(self.schema.type_id.simple_name.get_string(self.heap, self.address)?)
    }

    /// Number of records referring to this id.
    pub fn ref_count(&self) -> Result<u32> {
        Ok(self.schema.type_id.ref_count.get_u32(self.heap, self.address)?)
    }

    pub fn declarations(&self) -> Result<Vec<TypeRec<'t>>> {
        load_all(self.heap, self.schema.type_id.declarations.list(self.address), TypeRec::load)
    }

    /// Declarations whose superclass or interfaces name this id.
    pub fn subtypes(&self) -> Result<Vec<TypeRec<'t>>> {
        load_all(self.heap, self.schema.type_id.subtypes.list(self.address), TypeRec::load)
    }

    pub fn declaration_in(&self, resource: Address) -> Result<Option<TypeRec<'t>>> {
        for ty in self.declarations()? {
            if ty.resource()?.address() == resource {
                return Ok(Some(ty));
            }
        }
        Ok(None)
    }

    /// The declaration from the most recently scanned fully indexed resource.
    /// Equal scan times go to the lowest address.
    pub fn best_declaration(&self) -> Result<Option<TypeRec<'t>>> {
        let mut best: Option<(u64, TypeRec<'t>)> = None;
        let mut declarations = self.declarations()?;
        declarations.sort_by_key(TypeRec::address);
        for ty in declarations {
            let resource = ty.resource()?;
            if !resource.is_fully_indexed()? {
                continue;
            }
            let scanned = resource.last_scanned()?;
            if best.as_ref().is_none_or(|(top, _)| scanned > *top) {
                best = Some((scanned, ty));
            }
        }
        Ok(best.map(|(_, ty)| ty))
    }
}

impl<'t> TypeRec<'t> {
    pub fn resource(&self) -> Result<ResourceRec<'t>> {
        ResourceRec::load(self.heap, self.schema.ty.resource.get_address(self.heap, self.address)?)
    }

    pub fn type_id(&self) -> Result<TypeIdRec<'t>> {
        TypeIdRec::load(self.heap, self.schema.ty.type_id.get_address(self.heap, self.address)?)
    }

    pub fn descriptor(&self) -> Result<String> {
        self.type_id()?.descriptor()
    }

    pub fn access_flags(&self) -> Result<u32> {
        Ok(self.schema.ty.modifiers.get_u32(self.heap, self.address)?)
    }

    pub fn generic_signature(&self) -> Result<Option<String>> {
        Ok(non_empty(self.schema.ty.generic_signature.get_string(self.heap, self.address)?))
    }

    pub fn source_file(&self) -> Result<Option<String>> {
        Ok(non_empty(self.schema.ty.source_file.get_string(self.heap, self.address)?))
    }

    pub fn enclosing_type(&self) -> Result<Option<TypeIdRec<'t>>> {
        let id = self.schema.ty.enclosing.get_address(self.heap, self.address)?;
        if id.is_null() {
            return Ok(None);
        }
        TypeIdRec::load(self.heap, id).map(Some)
    }

    pub fn superclass(&self) -> Result<Option<SignatureRec<'t>>> {
        let signature = self.schema.ty.superclass.get_address(self.heap, self.address)?;
        if signature.is_null() {
            return Ok(None);
        }
        SignatureRec::load(self.heap, signature).map(Some)
    }

    pub fn interfaces(&self) -> Result<Vec<SignatureRec<'t>>> {
        load_all(self.heap, self.schema.ty.interfaces.list(self.address), SignatureRec::load)
    }

    pub fn methods(&self) -> Result<Vec<MethodRec<'t>>> {
        load_all(self.heap, self.schema.ty.methods.list(self.address), MethodRec::load)
    }

    pub fn fields(&self) -> Result<Vec<FieldRec<'t>>> {
        load_all(self.heap, self.schema.ty.fields.list(self.address), FieldRec::load)
    }

    pub fn annotations(&self) -> Result<Vec<AnnotationRec<'t>>> {
        load_all(self.heap, self.schema.ty.annotations.list(self.address), AnnotationRec::load)
    }

    /// Reads the whole declaration back into its pre-decoded form.
    pub fn to_stub(&self) -> Result<ClassStub> {
        Ok(ClassStub {
            descriptor: self.descriptor()?,
            access_flags: self.access_flags()?,
            generic_signature: self.generic_signature()?,
            source_file: self.source_file()?,
            enclosing_type: self.enclosing_type()?.map(|id| id.descriptor()).transpose()?,
            superclass: self.superclass()?.map(|s| s.to_stub()).transpose()?,
            interfaces: self.interfaces()?.iter().map(SignatureRec::to_stub).collect::<Result<_>>()?,
            methods: self.methods()?.iter().map(MethodRec::to_stub).collect::<Result<_>>()?,
            fields: self.fields()?.iter().map(FieldRec::to_stub).collect::<Result<_>>()?,
            annotations: self.annotations()?.iter().map(AnnotationRec::to_stub).collect::<Result<_>>()?,
        })
    }
}

impl<'t> MethodRec<'t> {
    pub fn name(&self) -> Result<String> {
        Ok(self.schema.method.name.get_string(self.heap, self.address)?)
    }

    pub fn descriptor(&self) -> Result<String> {
        Ok(self.schema.method.descriptor.get_string(self.heap, self.address)?)
    }

    pub fn generic_signature(&self) -> Result<Option<String>> {
        Ok(non_empty(self.schema.method.generic_signature.get_string(self.heap, self.address)?))
    }

    pub fn access_flags(&self) -> Result<u32> {
        Ok(self.schema.method.modifiers.get_u32(self.heap, self.address)?)
    }

    pub fn annotations(&self) -> Result<Vec<AnnotationRec<'t>>> {
        load_all(self.heap, self.schema.method.annotations.list(self.address), AnnotationRec::load)
    }

    pub fn default_value(&self) -> Result<Option<ConstantRec<'t>>> {
        let value = self.schema.method.default_value.get_address(self.heap, self.address)?;
        if value.is_null() {
            return Ok(None);
        }
        ConstantRec::load(self.heap, value).map(Some)
    }

    pub fn to_stub(&self) -> Result<MethodStub> {
        Ok(MethodStub {
            name: self.name()?,
            descriptor: self.descriptor()?,
            generic_signature: self.generic_signature()?,
            access_flags: self.access_flags()?,
            annotations: self.annotations()?.iter().map(AnnotationRec::to_stub).collect::<Result<_>>()?,
            default_value: self.default_value()?.map(|c| c.value()).transpose()?,
        })
    }
}

impl<'t> FieldRec<'t> {
    pub fn name(&self) -> Result<String> {
        Ok(self.schema.field.name.get_string(self.heap, self.address)?)
    }

    pub fn descriptor(&self) -> Result<String> {
        Ok(self.schema.field.descriptor.get_string(self.heap, self.address)?)
    }

    pub fn generic_signature(&self) -> Result<Option<String>> {
        Ok(non_empty(self.schema.field.generic_signature.get_string(self.heap, self.address)?))
    }

    pub fn access_flags(&self) -> Result<u32> {
        Ok(self.schema.field.modifiers.get_u32(self.heap, self.address)?)
    }

    pub fn constant(&self) -> Result<Option<ConstantRec<'t>>> {
        let value = self.schema.field.constant.get_address(self.heap, self.address)?;
        if value.is_null() {
            return Ok(None);
        }
        ConstantRec::load(self.heap, value).map(Some)
    }

    pub fn annotations(&self) -> Result<Vec<AnnotationRec<'t>>> {
        load_all(self.heap, self.schema.field.annotations.list(self.address), AnnotationRec::load)
    }

    pub fn to_stub(&self) -> Result<FieldStub> {
        Ok(FieldStub {
            name: self.name()?,
            descriptor: self.descriptor()?,
            generic_signature: self.generic_signature()?,
            access_flags: self.access_flags()?,
            constant: self.constant()?.map(|c| c.value()).transpose()?,
            annotations: self.annotations()?.iter().map(AnnotationRec::to_stub).collect::<Result<_>>()?,
        })
    }
}

impl<'t> SignatureRec<'t> {
    pub fn raw_type(&self) -> Result<TypeIdRec<'t>> {
        TypeIdRec::load(self.heap, self.schema.signature.raw_type.get_address(self.heap, self.address)?)
    }

    pub fn dimensions(&self) -> Result<u32> {
        Ok(self.schema.signature.dimensions.get_u32(self.heap, self.address)?)
    }

    pub fn arguments(&self) -> Result<Vec<TypeArgumentRec<'t>>> {
        load_all(self.heap, self.schema.signature.arguments.list(self.address), TypeArgumentRec::load)
    }

    pub fn to_stub(&self) -> Result<TypeSignatureStub> {
        self.to_stub_at(0)
    }

    fn to_stub_at(&self, depth: usize) -> Result<TypeSignatureStub> {
        nesting_guard(self.address, depth)?;
        Ok(TypeSignatureStub {
            descriptor: self.raw_type()?.descriptor()?,
            dimensions: self.dimensions()?,
            arguments: self
                .arguments()?
                .iter()
                .map(|argument| argument.to_stub_at(depth + 1))
                .collect::<Result<_>>()?,
        })
    }
}

impl<'t> TypeArgumentRec<'t> {
    pub fn wildcard(&self) -> Result<Wildcard> {
        let raw = self.schema.type_argument.wildcard.get_u8(self.heap, self.address)?;
        Wildcard::from_raw(raw).ok_or_else(|| {
            StorageError::Corruption {
                address: self.address,
                reason: "unknown wildcard kind",
            }
            .into()
        })
    }

    pub fn bound(&self) -> Result<Option<SignatureRec<'t>>> {
        let bound = self.schema.type_argument.bound.get_address(self.heap, self.address)?;
        if bound.is_null() {
            return Ok(None);
        }
        SignatureRec::load(self.heap, bound).map(Some)
    }

    pub fn to_stub(&self) -> Result<TypeArgumentStub> {
        self.to_stub_at(0)
    }

    fn to_stub_at(&self, depth: usize) -> Result<TypeArgumentStub> {
        Ok(TypeArgumentStub {
            wildcard: self.wildcard()?,
            bound: self.bound()?.map(|b| b.to_stub_at(depth + 1)).transpose()?,
        })
    }
}

impl<'t> AnnotationRec<'t> {
    pub fn annotation_type(&self) -> Result<TypeIdRec<'t>> {
        TypeIdRec::load(
            self.heap,
            self.schema.annotation.annotation_type.get_address(self.heap, self.address)?,
        )
    }

    pub fn values(&self) -> Result<Vec<AnnotationValueRec<'t>>> {
        load_all(self.heap, self.schema.annotation.values.list(self.address), AnnotationValueRec::load)
    }

    pub fn to_stub(&self) -> Result<AnnotationStub> {
        self.to_stub_at(0)
    }

    fn to_stub_at(&self, depth: usize) -> Result<AnnotationStub> {
        nesting_guard(self.address, depth)?;
        Ok(AnnotationStub {
            descriptor: self.annotation_type()?.descriptor()?,
            values: self
                .values()?
                .iter()
                .map(|value| {
                    Ok(AnnotationValueStub {
                        name: value.name()?,
                        value: value.value()?.value_at(depth + 1)?,
                    })
                })
                .collect::<Result<_>>()?,
        })
    }
}

impl<'t> AnnotationValueRec<'t> {
    pub fn name(&self) -> Result<String> {
        Ok(self.schema.annotation_value.name.get_string(self.heap, self.address)?)
    }

    pub fn value(&self) -> Result<ConstantRec<'t>> {
        ConstantRec::load(self.heap, self.schema.annotation_value.value.get_address(self.heap, self.address)?)
    }
}

impl<'t> ConstantRec<'t> {
    /// Concrete constant tag, one of `tags::BOOLEAN..=tags::ANNOTATION_CONSTANT`.
    pub fn kind(&self) -> Result<NodeTag> {
        Ok(self.schema.registry.load(self.heap, self.address)?.tag)
    }

    pub fn value(&self) -> Result<ConstantValue> {
        self.value_at(0)
    }

    fn value_at(&self, depth: usize) -> Result<ConstantValue> {
        nesting_guard(self.address, depth)?;
        let (heap, at, c) = (self.heap, self.address, &self.schema.constant);
        Ok(match self.kind()? {
            tags::BOOLEAN => ConstantValue::Boolean(c.boolean.get_bool(heap, at)?),
            tags::BYTE => ConstantValue::Byte(c.byte.get_i32(heap, at)? as i8),
            tags::CHAR => ConstantValue::Char(c.char.get_u16(heap, at)?),
            tags::SHORT => ConstantValue::Short(c.short.get_i32(heap, at)? as i16),
            tags::INT => ConstantValue::Int(c.int.get_i32(heap, at)?),
            tags::LONG => ConstantValue::Long(c.long.get_i64(heap, at)?),
            tags::FLOAT => ConstantValue::Float(c.float.get_f32(heap, at)?),
            tags::DOUBLE => ConstantValue::Double(c.double.get_f64(heap, at)?),
            tags::STRING => ConstantValue::String(c.string.get_string(heap, at)?),
            tags::CLASS => {
                let signature = SignatureRec::load(heap, c.class.get_address(heap, at)?)?;
                ConstantValue::Class(signature.to_stub_at(depth + 1)?)
            }
            tags::ENUM => ConstantValue::Enum {
                descriptor: TypeIdRec::load(heap, c.enum_type.get_address(heap, at)?)?.descriptor()?,
                name: c.enum_name.get_string(heap, at)?,
            },
            tags::ARRAY => ConstantValue::Array(
                load_all(heap, c.array.list(at), ConstantRec::load)?
                    .iter()
                    .map(|element| element.value_at(depth + 1))
                    .collect::<Result<_>>()?,
            ),
            tags::ANNOTATION_CONSTANT => {
                let annotation = AnnotationRec::load(heap, c.annotation.get_address(heap, at)?)?;
                ConstantValue::Annotation(annotation.to_stub_at(depth + 1)?)
            }
            other => {
                return Err(StorageError::UnexpectedKind {
                    address: at,
                    expected: "a concrete constant kind",
                    actual: self.schema.registry.name_of(other).to_string(),
                }
                .into())
            }
        })
    }
}

/// Any index record, dispatched on its stored tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JavaNode<'t> {
    Resource(ResourceRec<'t>),
    TypeId(TypeIdRec<'t>),
    Type(TypeRec<'t>),
    Method(MethodRec<'t>),
    Field(FieldRec<'t>),
    TypeSignature(SignatureRec<'t>),
    TypeArgument(TypeArgumentRec<'t>),
    Annotation(AnnotationRec<'t>),
    AnnotationValue(AnnotationValueRec<'t>),
    Constant(ConstantRec<'t>),
}

impl<'t> JavaNode<'t> {
    pub fn load(heap: &'t Heap, address: Address) -> Result<Self> {
        let schema = java_schema()?;
        let tag = schema.registry.load(heap, address)?.tag;
        Ok(match tag {
            tags::RESOURCE => JavaNode::Resource(ResourceRec { heap, schema, address }),
            tags::TYPE_ID => JavaNode::TypeId(TypeIdRec { heap, schema, address }),
            tags::TYPE => JavaNode::Type(TypeRec { heap, schema, address }),
            tags::METHOD => JavaNode::Method(MethodRec { heap, schema, address }),
            tags::FIELD => JavaNode::Field(FieldRec { heap, schema, address }),
            tags::TYPE_SIGNATURE => JavaNode::TypeSignature(SignatureRec { heap, schema, address }),
            tags::TYPE_ARGUMENT => JavaNode::TypeArgument(TypeArgumentRec { heap, schema, address }),
            tags::ANNOTATION => JavaNode::Annotation(AnnotationRec { heap, schema, address }),
            tags::ANNOTATION_VALUE => {
                JavaNode::AnnotationValue(AnnotationValueRec { heap, schema, address })
            }
            _ => JavaNode::Constant(ConstantRec::load(heap, address)?),
        })
    }

    pub fn address(&self) -> Address {
        match self {
            JavaNode::Resource(node) => node.address(),
            JavaNode::TypeId(node) => node.address(),
            JavaNode::Type(node) => node.address(),
            JavaNode::Method(node) => node.address(),
            JavaNode::Field(node) => node.address(),
            JavaNode::TypeSignature(node) => node.address(),
            JavaNode::TypeArgument(node) => node.address(),
            JavaNode::Annotation(node) => node.address(),
            JavaNode::AnnotationValue(node) => node.address(),
            JavaNode::Constant(node) => node.address(),
        }
    }
}
