//! Declarative record layouts.
//!
//! A [`StructDef`] collects typed fields; each call to [`StructDef::field`]
//! returns a [`FieldDesc`] whose offset is fixed immediately, so callers can
//! keep descriptors in statics next to the layout that owns them. A layout
//! extending another starts where the parent ends, which lets a derived node
//! kind be read through any ancestor's descriptors.

use thiserror::Error;

use crate::address::Address;
use crate::database::WriteTxn;
use crate::error::StorageError;
use crate::heap::Heap;
use crate::list::RecordList;
use crate::malloc::MAX_MALLOC_SIZE;
use crate::strings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("struct `{name}` needs {size} bytes, more than the maximum block size {max}")]
    TooLarge {
        name: &'static str,
        size: u32,
        max: u32,
    },
    #[error("struct `{name}` declares field `{field}` twice")]
    DuplicateField {
        name: &'static str,
        field: &'static str,
    },
    #[error("node tag {0} is registered twice")]
    DuplicateTag(u16),
    #[error("node tag {tag} names unregistered parent {parent}")]
    UnknownParent { tag: u16, parent: u16 },
    #[error("node kind `{0}` is abstract and cannot be instantiated")]
    AbstractKind(&'static str),
}

/// Storage kind of a field, which also decides what deleting the owning
/// record releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I32,
    I64,
    F32,
    F64,
    /// Address of a child node owned by this record.
    Pointer,
    /// Address of a record owned elsewhere.
    RecordRef,
    /// Address of an owned string chain.
    String,
    /// List of records owned elsewhere.
    List,
    /// List of child nodes owned by this record.
    OwnedList,
}

impl FieldKind {
    pub const fn width(self) -> u32 {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::U64
            | FieldKind::I64
            | FieldKind::F64
            | FieldKind::Pointer
            | FieldKind::RecordRef
            | FieldKind::String
            | FieldKind::List
            | FieldKind::OwnedList => 8,
        }
    }
}

/// A typed field at a fixed offset inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    name: &'static str,
    kind: FieldKind,
    offset: u32,
}

macro_rules! scalar_accessors {
    ($($get:ident, $put:ident, $ty:ty;)*) => {
        $(
            pub fn $get(&self, heap: &Heap, record: Address) -> Result<$ty, StorageError> {
                heap.$get(self.address(record))
            }

            pub fn $put(&self, txn: &mut WriteTxn<'_>, record: Address, value: $ty) -> Result<(), StorageError> {
                txn.$put(self.address(record), value)
            }
        )*
    };
}

impl FieldDesc {
    pub(crate) const fn at(name: &'static str, kind: FieldKind, offset: u32) -> Self {
        Self { name, kind, offset }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Address of this field inside `record`.
    pub fn address(&self, record: Address) -> Address {
        record.offset(self.offset)
    }

    scalar_accessors! {
        get_u8, put_u8, u8;
        get_u16, put_u16, u16;
        get_u32, put_u32, u32;
        get_u64, put_u64, u64;
        get_i32, put_i32, i32;
        get_i64, put_i64, i64;
        get_f32, put_f32, f32;
        get_f64, put_f64, f64;
    }

    pub fn get_bool(&self, heap: &Heap, record: Address) -> Result<bool, StorageError> {
        Ok(self.get_u8(heap, record)? != 0)
    }

    pub fn put_bool(&self, txn: &mut WriteTxn<'_>, record: Address, value: bool) -> Result<(), StorageError> {
        self.put_u8(txn, record, u8::from(value))
    }

    pub fn get_address(&self, heap: &Heap, record: Address) -> Result<Address, StorageError> {
        heap.get_address(self.address(record))
    }

    pub fn put_address(&self, txn: &mut WriteTxn<'_>, record: Address, value: Address) -> Result<(), StorageError> {
        txn.put_address(self.address(record), value)
    }

    pub fn get_string(&self, heap: &Heap, record: Address) -> Result<String, StorageError> {
        strings::read_string(heap, self.get_address(heap, record)?)
    }

    /// Replaces the string stored in this field, releasing the old chain.
    pub fn put_string(&self, txn: &mut WriteTxn<'_>, record: Address, value: &str) -> Result<(), StorageError> {
        let old = self.get_address(txn, record)?;
        let new = strings::write_string(txn, value)?;
        self.put_address(txn, record, new)?;
        strings::free_string(txn, old)
    }

    /// List rooted in this field of `record`.
    pub fn list(&self, record: Address) -> RecordList {
        RecordList::at(self.address(record))
    }
}

/// A record layout under construction.
#[derive(Debug, Clone)]
pub struct StructDef {
    name: &'static str,
    fields: Vec<FieldDesc>,
    size: u32,
}

impl StructDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            size: 0,
        }
    }

    /// Starts a layout whose first bytes are `parent`'s fields.
    pub fn extending(name: &'static str, parent: &StructLayout) -> Self {
        Self {
            name,
            fields: parent.fields.clone(),
            size: parent.size,
        }
    }

    /// Appends a field aligned to its own width.
    pub fn field(&mut self, name: &'static str, kind: FieldKind) -> FieldDesc {
        let width = kind.width();
        let offset = self.size.div_ceil(width) * width;
        let desc = FieldDesc::at(name, kind, offset);
        self.size = offset + width;
        self.fields.push(desc);
        desc
    }

    pub fn finalize(self) -> Result<StructLayout, SchemaError> {
        if self.size > MAX_MALLOC_SIZE {
            return Err(SchemaError::TooLarge {
                name: self.name,
                size: self.size,
                max: MAX_MALLOC_SIZE,
            });
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|prior| prior.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    name: self.name,
                    field: field.name,
                });
            }
        }
        Ok(StructLayout {
            name: self.name,
            fields: self.fields,
            size: self.size,
        })
    }
}

/// A finalized record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    name: &'static str,
    fields: Vec<FieldDesc>,
    size: u32,
}

impl StructLayout {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<FieldDesc> {
        self.fields.iter().copied().find(|field| field.name == name)
    }
}
