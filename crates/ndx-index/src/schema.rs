//! Record layouts and node kinds of the Java type index.
//!
//! Layouts are built once per process from a static table. Every node kind
//! gets its tag here; tags are part of the on-disk format, so renumbering
//! them requires bumping the store version.

use std::sync::LazyLock;

use ndx_storage::{
    root_slot_address, Address, FieldDesc, FieldKind, NodeTag, NodeType, NodeTypeRegistry, Pool,
    SchemaError, StorageError, StringFieldIndex, StructDef, StructLayout, WriteTxn,
};

pub mod tags {
    use ndx_storage::NodeTag;

    pub const RESOURCE: NodeTag = 1;
    pub const TYPE_ID: NodeTag = 2;
    pub const TYPE: NodeTag = 3;
    pub const METHOD: NodeTag = 4;
    pub const FIELD: NodeTag = 5;
    pub const TYPE_SIGNATURE: NodeTag = 6;
    pub const TYPE_ARGUMENT: NodeTag = 7;
    pub const ANNOTATION: NodeTag = 8;
    pub const ANNOTATION_VALUE: NodeTag = 9;
    /// Abstract parent of every constant kind.
    pub const CONSTANT: NodeTag = 10;
    pub const BOOLEAN: NodeTag = 11;
    pub const BYTE: NodeTag = 12;
    pub const CHAR: NodeTag = 13;
    pub const SHORT: NodeTag = 14;
    pub const INT: NodeTag = 15;
    pub const LONG: NodeTag = 16;
    pub const FLOAT: NodeTag = 17;
    pub const DOUBLE: NodeTag = 18;
    pub const STRING: NodeTag = 19;
    pub const CLASS: NodeTag = 20;
    pub const ENUM: NodeTag = 21;
    pub const ARRAY: NodeTag = 22;
    pub const ANNOTATION_CONSTANT: NodeTag = 23;
}

pub const TYPES_POOL: Pool = Pool::new(4);
pub const MEMBERS_POOL: Pool = Pool::new(5);
pub const CONSTANTS_POOL: Pool = Pool::new(6);

pub(crate) const TYPE_IDS_BY_DESCRIPTOR_SLOT: usize = 0;
pub(crate) const TYPE_IDS_BY_SIMPLE_NAME_SLOT: usize = 1;
pub(crate) const RESOURCES_BY_PATH_SLOT: usize = 2;
pub(crate) const SCAN_COUNTER_SLOT: usize = 3;

/// Resource flag: every type of the resource was written.
pub const FULLY_INDEXED: u32 = 0x1;

#[derive(Debug, Clone, Copy)]
pub struct ResourceFields {
    pub path: FieldDesc,
    pub size: FieldDesc,
    pub modified: FieldDesc,
    pub content_hash: FieldDesc,
    pub last_scanned: FieldDesc,
    pub flags: FieldDesc,
    pub types: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct TypeIdFields {
    pub descriptor: FieldDesc,
    pub simple_name: FieldDesc,
    pub ref_count: FieldDesc,
    /// Type records declaring this id, one per resource that contains it.
    pub declarations: FieldDesc,
    /// Type records naming this id as superclass or interface.
    pub subtypes: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct TypeFields {
    pub resource: FieldDesc,
    pub type_id: FieldDesc,
    pub modifiers: FieldDesc,
    pub generic_signature: FieldDesc,
    pub source_file: FieldDesc,
    pub enclosing: FieldDesc,
    pub superclass: FieldDesc,
    pub interfaces: FieldDesc,
    pub methods: FieldDesc,
    pub fields: FieldDesc,
    pub annotations: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodFields {
    pub name: FieldDesc,
    pub descriptor: FieldDesc,
    pub generic_signature: FieldDesc,
    pub modifiers: FieldDesc,
    pub annotations: FieldDesc,
    pub default_value: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldFields {
    pub name: FieldDesc,
    pub descriptor: FieldDesc,
    pub generic_signature: FieldDesc,
    pub modifiers: FieldDesc,
    pub constant: FieldDesc,
    pub annotations: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct SignatureFields {
    pub raw_type: FieldDesc,
    pub dimensions: FieldDesc,
    pub arguments: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct TypeArgumentFields {
    pub wildcard: FieldDesc,
    pub bound: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct AnnotationFields {
    pub annotation_type: FieldDesc,
    pub values: FieldDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct AnnotationValueFields {
    pub name: FieldDesc,
    pub value: FieldDesc,
}

/// Value fields of the concrete constant kinds.
#[derive(Debug, Clone, Copy)]
pub struct ConstantFields {
    pub boolean: FieldDesc,
    pub byte: FieldDesc,
    pub char: FieldDesc,
    pub short: FieldDesc,
    pub int: FieldDesc,
    pub long: FieldDesc,
    pub float: FieldDesc,
    pub double: FieldDesc,
    pub string: FieldDesc,
    pub class: FieldDesc,
    pub enum_type: FieldDesc,
    pub enum_name: FieldDesc,
    pub array: FieldDesc,
    pub annotation: FieldDesc,
}

#[derive(Debug)]
pub struct JavaSchema {
    pub registry: NodeTypeRegistry,
    pub resource: ResourceFields,
    pub type_id: TypeIdFields,
    pub ty: TypeFields,
    pub method: MethodFields,
    pub field: FieldFields,
    pub signature: SignatureFields,
    pub type_argument: TypeArgumentFields,
    pub annotation: AnnotationFields,
    pub annotation_value: AnnotationValueFields,
    pub constant: ConstantFields,
}

static JAVA_SCHEMA: LazyLock<Result<JavaSchema, SchemaError>> = LazyLock::new(JavaSchema::build);

/// The process-wide schema table.
pub fn java_schema() -> Result<&'static JavaSchema, SchemaError> {
    JAVA_SCHEMA.as_ref().map_err(SchemaError::clone)
}

fn hook_schema() -> Result<&'static JavaSchema, StorageError> {
    java_schema().map_err(StorageError::from)
}

impl JavaSchema {
    fn build() -> Result<Self, SchemaError> {
        let mut registry = NodeTypeRegistry::new();

        let mut def = StructDef::node("Resource");
        let resource = ResourceFields {
            path: def.field("path", FieldKind::String),
            size: def.field("size", FieldKind::U64),
            modified: def.field("modified", FieldKind::U64),
            content_hash: def.field("content_hash", FieldKind::U64),
            last_scanned: def.field("last_scanned", FieldKind::U64),
            flags: def.field("flags", FieldKind::U32),
            types: def.field("types", FieldKind::OwnedList),
        };
        registry.register(
            NodeType::new(tags::RESOURCE, "Resource", def.finalize()?)
                .in_pool(TYPES_POOL)
                .on_destruct(destruct_resource),
        )?;

        let mut def = StructDef::node("TypeId");
        let type_id = TypeIdFields {
            descriptor: def.field("descriptor", FieldKind::String),
            simple_name: def.field("simple_name", FieldKind::String),
            ref_count: def.field("ref_count", FieldKind::U32),
            declarations: def.field("declarations", FieldKind::List),
            subtypes: def.field("subtypes", FieldKind::List),
        };
        registry.register(
            NodeType::new(tags::TYPE_ID, "TypeId", def.finalize()?)
                .in_pool(TYPES_POOL)
                .on_destruct(destruct_type_id),
        )?;

        let mut def = StructDef::node("Type");
        let ty = TypeFields {
            resource: def.field("resource", FieldKind::RecordRef),
            type_id: def.field("type_id", FieldKind::RecordRef),
            modifiers: def.field("modifiers", FieldKind::U32),
            generic_signature: def.field("generic_signature", FieldKind::String),
            source_file: def.field("source_file", FieldKind::String),
            enclosing: def.field("enclosing", FieldKind::RecordRef),
            superclass: def.field("superclass", FieldKind::Pointer),
            interfaces: def.field("interfaces", FieldKind::OwnedList),
            methods: def.field("methods", FieldKind::OwnedList),
            fields: def.field("fields", FieldKind::OwnedList),
            annotations: def.field("annotations", FieldKind::OwnedList),
        };
        registry.register(
            NodeType::new(tags::TYPE, "Type", def.finalize()?)
                .in_pool(TYPES_POOL)
                .on_destruct(destruct_type),
        )?;

        let mut def = StructDef::node("Method");
        let method = MethodFields {
            name: def.field("name", FieldKind::String),
            descriptor: def.field("descriptor", FieldKind::String),
            generic_signature: def.field("generic_signature", FieldKind::String),
            modifiers: def.field("modifiers", FieldKind::U32),
            annotations: def.field("annotations", FieldKind::OwnedList),
            default_value: def.field("default_value", FieldKind::Pointer),
        };
        registry.register(NodeType::new(tags::METHOD, "Method", def.finalize()?).in_pool(MEMBERS_POOL))?;

        let mut def = StructDef::node("Field");
        let field = FieldFields {
            name: def.field("name", FieldKind::String),
            descriptor: def.field("descriptor", FieldKind::String),
            generic_signature: def.field("generic_signature", FieldKind::String),
            modifiers: def.field("modifiers", FieldKind::U32),
            constant: def.field("constant", FieldKind::Pointer),
            annotations: def.field("annotations", FieldKind::OwnedList),
        };
        registry.register(NodeType::new(tags::FIELD, "Field", def.finalize()?).in_pool(MEMBERS_POOL))?;

        let mut def = StructDef::node("TypeSignature");
        let signature = SignatureFields {
            raw_type: def.field("raw_type", FieldKind::RecordRef),
            dimensions: def.field("dimensions", FieldKind::U32),
            arguments: def.field("arguments", FieldKind::OwnedList),
        };
        registry.register(
            NodeType::new(tags::TYPE_SIGNATURE, "TypeSignature", def.finalize()?)
                .in_pool(MEMBERS_POOL)
                .on_destruct(destruct_signature),
        )?;

        let mut def = StructDef::node("TypeArgument");
        let type_argument = TypeArgumentFields {
            wildcard: def.field("wildcard", FieldKind::U8),
            bound: def.field("bound", FieldKind::Pointer),
        };
        registry.register(
            NodeType::new(tags::TYPE_ARGUMENT, "TypeArgument", def.finalize()?).in_pool(MEMBERS_POOL),
        )?;

        let mut def = StructDef::node("Annotation");
        let annotation = AnnotationFields {
            annotation_type: def.field("annotation_type", FieldKind::RecordRef),
            values: def.field("values", FieldKind::OwnedList),
        };
        registry.register(
            NodeType::new(tags::ANNOTATION, "Annotation", def.finalize()?)
                .in_pool(MEMBERS_POOL)
                .on_destruct(destruct_annotation),
        )?;

        let mut def = StructDef::node("AnnotationValue");
        let annotation_value = AnnotationValueFields {
            name: def.field("name", FieldKind::String),
            value: def.field("value", FieldKind::Pointer),
        };
        registry.register(
            NodeType::new(tags::ANNOTATION_VALUE, "AnnotationValue", def.finalize()?).in_pool(MEMBERS_POOL),
        )?;

        let base = StructDef::node("Constant").finalize()?;
        registry.register(NodeType::abstract_kind(tags::CONSTANT, "Constant"))?;

        let constant_kind = |tag: NodeTag,
                                 name: &'static str,
                                 kind: FieldKind,
                                 registry: &mut NodeTypeRegistry|
         -> Result<FieldDesc, SchemaError> {
            let mut def = StructDef::extending(name, &base);
            let value = def.field("value", kind);
            registry.register(
                NodeType::new(tag, name, def.finalize()?)
                    .extends(tags::CONSTANT)
                    .in_pool(CONSTANTS_POOL),
            )?;
            Ok(value)
        };
        let boolean = constant_kind(tags::BOOLEAN, "BooleanConstant", FieldKind::U8, &mut registry)?;
        let byte = constant_kind(tags::BYTE, "ByteConstant", FieldKind::I32, &mut registry)?;
        let char = constant_kind(tags::CHAR, "CharConstant", FieldKind::U16, &mut registry)?;
        let short = constant_kind(tags::SHORT, "ShortConstant", FieldKind::I32, &mut registry)?;
        let int = constant_kind(tags::INT, "IntConstant", FieldKind::I32, &mut registry)?;
        let long = constant_kind(tags::LONG, "LongConstant", FieldKind::I64, &mut registry)?;
        let float = constant_kind(tags::FLOAT, "FloatConstant", FieldKind::F32, &mut registry)?;
        let double = constant_kind(tags::DOUBLE, "DoubleConstant", FieldKind::F64, &mut registry)?;
        let string = constant_kind(tags::STRING, "StringConstant", FieldKind::String, &mut registry)?;
        let class = constant_kind(tags::CLASS, "ClassConstant", FieldKind::Pointer, &mut registry)?;
        let array = constant_kind(tags::ARRAY, "ArrayConstant", FieldKind::OwnedList, &mut registry)?;
        let annotation_constant = constant_kind(
            tags::ANNOTATION_CONSTANT,
            "AnnotationConstant",
            FieldKind::Pointer,
            &mut registry,
        )?;

        let mut def = StructDef::extending("EnumConstant", &base);
        let enum_type = def.field("enum_type", FieldKind::RecordRef);
        let enum_name = def.field("name", FieldKind::String);
        registry.register(
            NodeType::new(tags::ENUM, "EnumConstant", def.finalize()?)
                .extends(tags::CONSTANT)
                .in_pool(CONSTANTS_POOL)
                .on_destruct(destruct_enum),
        )?;

        Ok(Self {
            registry,
            resource,
            type_id,
            ty,
            method,
            field,
            signature,
            type_argument,
            annotation,
            annotation_value,
            constant: ConstantFields {
                boolean,
                byte,
                char,
                short,
                int,
                long,
                float,
                double,
                string,
                class,
                enum_type,
                enum_name,
                array,
                annotation: annotation_constant,
            },
        })
    }

    pub fn layout(&self, tag: NodeTag) -> Option<&StructLayout> {
        self.registry.get(tag).and_then(|node_type| node_type.layout.as_ref())
    }

    pub(crate) fn type_ids_by_descriptor(&self) -> StringFieldIndex {
        StringFieldIndex::new(
            root_slot_address(TYPE_IDS_BY_DESCRIPTOR_SLOT),
            self.type_id.descriptor,
        )
    }

    pub(crate) fn type_ids_by_simple_name(&self) -> StringFieldIndex {
        StringFieldIndex::new(
            root_slot_address(TYPE_IDS_BY_SIMPLE_NAME_SLOT),
            self.type_id.simple_name,
        )
    }

    pub(crate) fn resources_by_path(&self) -> StringFieldIndex {
        StringFieldIndex::new(root_slot_address(RESOURCES_BY_PATH_SLOT), self.resource.path)
    }

    /// Adds one reference to a type id.
    pub(crate) fn retain_type_id(&self, txn: &mut WriteTxn<'_>, id: Address) -> Result<(), StorageError> {
        let count = self.type_id.ref_count.get_u32(txn, id)?;
        self.type_id.ref_count.put_u32(txn, id, count.saturating_add(1))
    }

    /// Drops one reference to a type id, deleting it when the last one goes.
    pub(crate) fn release_type_id(
        &self,
        txn: &mut WriteTxn<'_>,
        registry: &NodeTypeRegistry,
        id: Address,
    ) -> Result<(), StorageError> {
        if id.is_null() {
            return Ok(());
        }
        registry.load_typed(txn, id, tags::TYPE_ID)?;
        let count = self.type_id.ref_count.get_u32(txn, id)?;
        match count {
            0 => Err(StorageError::Corruption {
                address: id,
                reason: "type id reference count underflow",
            }),
            1 => registry.delete(txn, id),
            _ => self.type_id.ref_count.put_u32(txn, id, count - 1),
        }
    }
}

fn destruct_resource(txn: &mut WriteTxn<'_>, _: &NodeTypeRegistry, resource: Address) -> Result<(), StorageError> {
    let schema = hook_schema()?;
    schema.resources_by_path().delete(txn, resource)?;
    Ok(())
}

fn destruct_type_id(txn: &mut WriteTxn<'_>, _: &NodeTypeRegistry, id: Address) -> Result<(), StorageError> {
    let schema = hook_schema()?;
    schema.type_ids_by_descriptor().delete(txn, id)?;
    schema.type_ids_by_simple_name().delete(txn, id)?;
    Ok(())
}

fn destruct_type(txn: &mut WriteTxn<'_>, registry: &NodeTypeRegistry, ty: Address) -> Result<(), StorageError> {
    let schema = hook_schema()?;
    let fields = &schema.ty;

    let mut supertypes = Vec::new();
    let superclass = fields.superclass.get_address(txn, ty)?;
    if !superclass.is_null() {
        supertypes.push(superclass);
    }
    supertypes.extend(fields.interfaces.list(ty).items(txn)?);
    for signature in supertypes {
        let raw = schema.signature.raw_type.get_address(txn, signature)?;
        if !raw.is_null() {
            schema.type_id.subtypes.list(raw).remove(txn, ty)?;
        }
    }

    let id = fields.type_id.get_address(txn, ty)?;
    if !id.is_null() {
        schema.type_id.declarations.list(id).remove(txn, ty)?;
        schema.release_type_id(txn, registry, id)?;
    }
    let enclosing = fields.enclosing.get_address(txn, ty)?;
    schema.release_type_id(txn, registry, enclosing)
}

fn destruct_signature(txn: &mut WriteTxn<'_>, registry: &NodeTypeRegistry, signature: Address) -> Result<(), StorageError> {
    let schema = hook_schema()?;
    let raw = schema.signature.raw_type.get_address(txn, signature)?;
    schema.release_type_id(txn, registry, raw)
}

fn destruct_annotation(
    txn: &mut WriteTxn<'_>,
    registry: &NodeTypeRegistry,
    annotation: Address,
) -> Result<(), StorageError> {
    let schema = hook_schema()?;
    let id = schema.annotation.annotation_type.get_address(txn, annotation)?;
    schema.release_type_id(txn, registry, id)
}

fn destruct_enum(txn: &mut WriteTxn<'_>, registry: &NodeTypeRegistry, constant: Address) -> Result<(), StorageError> {
    let schema = hook_schema()?;
    let id = schema.constant.enum_type.get_address(txn, constant)?;
    schema.release_type_id(txn, registry, id)
}
