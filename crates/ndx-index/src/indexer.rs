//! Writes pre-decoded class facts into the index.
//!
//! A resource is created first with its flags cleared, its types are written
//! one by one, and only then is it marked fully indexed and allowed to
//! replace older resources at the same path. Cancellation between types
//! leaves a structurally valid, partially indexed resource behind; readers
//! treat it as not indexed and the next successful scan of the path deletes
//! it.

use ndx_storage::{Address, WriteTxn};
use tokio_util::sync::CancellationToken;

use crate::descriptor;
use crate::error::{IndexError, Result};
use crate::fingerprint::{backing_file, Fingerprint};
use crate::java_index::JavaIndex;
use crate::nodes::MAX_NESTING;
use crate::schema::{tags, FULLY_INDEXED, SCAN_COUNTER_SLOT};
use crate::stubs::{AnnotationStub, ClassStub, ConstantValue, FieldStub, MethodStub, TypeSignatureStub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed { resource: Address, types: usize },
    /// The token fired before every type was written.
    Cancelled { resource: Address },
}

impl IndexOutcome {
    pub fn resource(&self) -> Address {
        match *self {
            IndexOutcome::Indexed { resource, .. } | IndexOutcome::Cancelled { resource } => resource,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexOutcome::Cancelled { .. })
    }
}

impl JavaIndex {
    /// Records `classes` as the contents of the resource at `path`.
    ///
    /// Older resources with the same path are deleted once the new one is
    /// complete.
    pub fn index_resource(
        &self,
        txn: &mut WriteTxn<'_>,
        path: &str,
        fingerprint: Fingerprint,
        classes: &[ClassStub],
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome> {
        for class in classes {
            check_class(class)?;
        }

        let schema = self.schema();
        let fields = &schema.resource;
        let scan = txn.root(SCAN_COUNTER_SLOT)?.wrapping_add(1);
        txn.set_root(SCAN_COUNTER_SLOT, scan)?;

        let resource = schema.registry.create(txn, tags::RESOURCE)?;
        fields.path.put_string(txn, resource, path)?;
        fields.size.put_u64(txn, resource, fingerprint.size)?;
        fields.modified.put_u64(txn, resource, fingerprint.modified_nanos)?;
        fields.content_hash.put_u64(txn, resource, fingerprint.content_hash)?;
        fields.last_scanned.put_u64(txn, resource, scan)?;
        schema.resources_by_path().insert(txn, resource)?;

        for class in classes {
            if cancel.is_cancelled() {
                tracing::debug!(target: "ndx.index", path, "indexing cancelled");
                return Ok(IndexOutcome::Cancelled { resource });
            }
            self.write_type(txn, resource, class)?;
        }
        fields.flags.put_u32(txn, resource, FULLY_INDEXED)?;

        let superseded = schema.resources_by_path().find_all(txn, path)?;
        for older in superseded.into_iter().filter(|older| *older != resource) {
            schema.registry.delete(txn, older)?;
        }
        self.fingerprints().dirty(backing_file(path));

        Ok(IndexOutcome::Indexed {
            resource,
            types: classes.len(),
        })
    }

    /// Deletes every resource indexed under `path`. Returns how many there were.
    pub fn remove_resource(&self, txn: &mut WriteTxn<'_>, path: &str) -> Result<usize> {
        let schema = self.schema();
        let resources = schema.resources_by_path().find_all(txn, path)?;
        for resource in &resources {
            schema.registry.delete(txn, *resource)?;
        }
        self.fingerprints().dirty(backing_file(path));
        Ok(resources.len())
    }

    /// Fingerprints the file backing `path`, then indexes `classes` under the
    /// write lock, flushing afterwards if configured to.
    pub fn index_file(
        &self,
        path: &str,
        classes: &[ClassStub],
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome> {
        let fingerprint = Fingerprint::of_file(backing_file(path))?;
        let outcome = {
            let mut txn = self.write();
            self.index_resource(&mut txn, path, fingerprint, classes, cancel)?
        };
        if self.flush_on_index() {
            self.flush()?;
        }
        tracing::debug!(
            target: "ndx.index",
            path,
            cancelled = outcome.is_cancelled(),
            "indexed resource"
        );
        Ok(outcome)
    }

    /// Finds or creates the id for `descriptor` and takes a reference to it.
    fn reference_type_id(&self, txn: &mut WriteTxn<'_>, descriptor: &str) -> Result<Address> {
        let id = self.create_type_id(txn, descriptor)?;
        self.schema().retain_type_id(txn, id)?;
        Ok(id)
    }

    fn write_type(&self, txn: &mut WriteTxn<'_>, resource: Address, class: &ClassStub) -> Result<Address> {
        let schema = self.schema();
        let fields = &schema.ty;
        let ty = schema.registry.create(txn, tags::TYPE)?;
        fields.resource.put_address(txn, ty, resource)?;
        schema.resource.types.list(resource).push(txn, ty)?;

        let id = self.reference_type_id(txn, &class.descriptor)?;
        fields.type_id.put_address(txn, ty, id)?;
        schema.type_id.declarations.list(id).push(txn, ty)?;

        fields.modifiers.put_u32(txn, ty, class.access_flags)?;
        if let Some(signature) = &class.generic_signature {
            fields.generic_signature.put_string(txn, ty, signature)?;
        }
        if let Some(source_file) = &class.source_file {
            fields.source_file.put_string(txn, ty, source_file)?;
        }
        if let Some(enclosing) = &class.enclosing_type {
            let enclosing = self.reference_type_id(txn, enclosing)?;
            fields.enclosing.put_address(txn, ty, enclosing)?;
        }

        if let Some(superclass) = &class.superclass {
            let signature = self.write_signature(txn, superclass)?;
            fields.superclass.put_address(txn, ty, signature)?;
            self.link_subtype(txn, signature, ty)?;
        }
        for interface in &class.interfaces {
            let signature = self.write_signature(txn, interface)?;
            fields.interfaces.list(ty).push(txn, signature)?;
            self.link_subtype(txn, signature, ty)?;
        }

        for method in &class.methods {
            let method = self.write_method(txn, method)?;
            fields.methods.list(ty).push(txn, method)?;
        }
        for field in &class.fields {
            let field = self.write_field(txn, field)?;
            fields.fields.list(ty).push(txn, field)?;
        }
        for annotation in &class.annotations {
            let annotation = self.write_annotation(txn, annotation)?;
            fields.annotations.list(ty).push(txn, annotation)?;
        }
        Ok(ty)
    }

    fn link_subtype(&self, txn: &mut WriteTxn<'_>, signature: Address, ty: Address) -> Result<()> {
        let schema = self.schema();
        let raw = schema.signature.raw_type.get_address(txn, signature)?;
        schema.type_id.subtypes.list(raw).push(txn, ty)?;
        Ok(())
    }

    fn write_method(&self, txn: &mut WriteTxn<'_>, stub: &MethodStub) -> Result<Address> {
        let schema = self.schema();
        let fields = &schema.method;
        let method = schema.registry.create(txn, tags::METHOD)?;
        fields.name.put_string(txn, method, &stub.name)?;
        fields.descriptor.put_string(txn, method, &stub.descriptor)?;
        if let Some(signature) = &stub.generic_signature {
            fields.generic_signature.put_string(txn, method, signature)?;
        }
        fields.modifiers.put_u32(txn, method, stub.access_flags)?;
        for annotation in &stub.annotations {
            let annotation = self.write_annotation(txn, annotation)?;
            fields.annotations.list(method).push(txn, annotation)?;
        }
        if let Some(default) = &stub.default_value {
            let value = self.write_constant(txn, default)?;
            fields.default_value.put_address(txn, method, value)?;
        }
        Ok(method)
    }

    fn write_field(&self, txn: &mut WriteTxn<'_>, stub: &FieldStub) -> Result<Address> {
        let schema = self.schema();
        let fields = &schema.field;
        let field = schema.registry.create(txn, tags::FIELD)?;
        fields.name.put_string(txn, field, &stub.name)?;
        fields.descriptor.put_string(txn, field, &stub.descriptor)?;
        if let Some(signature) = &stub.generic_signature {
            fields.generic_signature.put_string(txn, field, signature)?;
        }
        fields.modifiers.put_u32(txn, field, stub.access_flags)?;
        if let Some(constant) = &stub.constant {
            let value = self.write_constant(txn, constant)?;
            fields.constant.put_address(txn, field, value)?;
        }
        for annotation in &stub.annotations {
            let annotation = self.write_annotation(txn, annotation)?;
            fields.annotations.list(field).push(txn, annotation)?;
        }
        Ok(field)
    }

    fn write_signature(&self, txn: &mut WriteTxn<'_>, stub: &TypeSignatureStub) -> Result<Address> {
        let schema = self.schema();
        let signature = schema.registry.create(txn, tags::TYPE_SIGNATURE)?;
        let raw = self.reference_type_id(txn, &stub.descriptor)?;
        schema.signature.raw_type.put_address(txn, signature, raw)?;
        schema.signature.dimensions.put_u32(txn, signature, stub.dimensions)?;

        for argument in &stub.arguments {
            let node = schema.registry.create(txn, tags::TYPE_ARGUMENT)?;
            schema
                .type_argument
                .wildcard
                .put_u8(txn, node, argument.wildcard.to_raw())?;
            if let Some(bound) = &argument.bound {
                let bound = self.write_signature(txn, bound)?;
                schema.type_argument.bound.put_address(txn, node, bound)?;
            }
            schema.signature.arguments.list(signature).push(txn, node)?;
        }
        Ok(signature)
    }

    fn write_annotation(&self, txn: &mut WriteTxn<'_>, stub: &AnnotationStub) -> Result<Address> {
        let schema = self.schema();
        let annotation = schema.registry.create(txn, tags::ANNOTATION)?;
        let id = self.reference_type_id(txn, &stub.descriptor)?;
        schema.annotation.annotation_type.put_address(txn, annotation, id)?;

        for pair in &stub.values {
            let node = schema.registry.create(txn, tags::ANNOTATION_VALUE)?;
            schema.annotation_value.name.put_string(txn, node, &pair.name)?;
            let value = self.write_constant(txn, &pair.value)?;
            schema.annotation_value.value.put_address(txn, node, value)?;
            schema.annotation.values.list(annotation).push(txn, node)?;
        }
        Ok(annotation)
    }

    fn write_constant(&self, txn: &mut WriteTxn<'_>, value: &ConstantValue) -> Result<Address> {
        let schema = self.schema();
        let registry = &schema.registry;
        let c = &schema.constant;
        let node = match value {
            ConstantValue::Boolean(v) => {
                let node = registry.create(txn, tags::BOOLEAN)?;
                c.boolean.put_bool(txn, node, *v)?;
                node
            }
            ConstantValue::Byte(v) => {
                let node = registry.create(txn, tags::BYTE)?;
                c.byte.put_i32(txn, node, i32::from(*v))?;
                node
            }
            ConstantValue::Char(v) => {
                let node = registry.create(txn, tags::CHAR)?;
                c.char.put_u16(txn, node, *v)?;
                node
            }
            ConstantValue::Short(v) => {
                let node = registry.create(txn, tags::SHORT)?;
                c.short.put_i32(txn, node, i32::from(*v))?;
                node
            }
            ConstantValue::Int(v) => {
                let node = registry.create(txn, tags::INT)?;
                c.int.put_i32(txn, node, *v)?;
                node
            }
            ConstantValue::Long(v) => {
                let node = registry.create(txn, tags::LONG)?;
                c.long.put_i64(txn, node, *v)?;
                node
            }
            ConstantValue::Float(v) => {
                let node = registry.create(txn, tags::FLOAT)?;
                c.float.put_f32(txn, node, *v)?;
                node
            }
            ConstantValue::Double(v) => {
                let node = registry.create(txn, tags::DOUBLE)?;
                c.double.put_f64(txn, node, *v)?;
                node
            }
            ConstantValue::String(v) => {
                let node = registry.create(txn, tags::STRING)?;
                c.string.put_string(txn, node, v)?;
                node
            }
            ConstantValue::Class(signature) => {
                let node = registry.create(txn, tags::CLASS)?;
                let signature = self.write_signature(txn, signature)?;
                c.class.put_address(txn, node, signature)?;
                node
            }
            ConstantValue::Enum { descriptor, name } => {
                let node = registry.create(txn, tags::ENUM)?;
                let id = self.reference_type_id(txn, descriptor)?;
                c.enum_type.put_address(txn, node, id)?;
                c.enum_name.put_string(txn, node, name)?;
                node
            }
            ConstantValue::Array(elements) => {
                let node = registry.create(txn, tags::ARRAY)?;
                for element in elements {
                    let element = self.write_constant(txn, element)?;
                    c.array.list(node).push(txn, element)?;
                }
                node
            }
            ConstantValue::Annotation(annotation) => {
                let node = registry.create(txn, tags::ANNOTATION_CONSTANT)?;
                let annotation = self.write_annotation(txn, annotation)?;
                c.annotation.put_address(txn, node, annotation)?;
                node
            }
        };
        Ok(node)
    }
}

/// Rejects a class the store could not hold or read back unchanged, before
/// anything is written for it.
fn check_class(class: &ClassStub) -> Result<()> {
    let invalid = |reason| IndexError::InvalidClass {
        descriptor: class.descriptor.clone(),
        reason,
    };
    descriptor::validate(&class.descriptor)?;
    if is_empty_some(&class.generic_signature) {
        return Err(invalid("empty generic signature"));
    }
    if is_empty_some(&class.source_file) {
        return Err(invalid("empty source file"));
    }
    if let Some(enclosing) = &class.enclosing_type {
        descriptor::validate(enclosing)?;
    }
    if let Some(superclass) = &class.superclass {
        check_signature(superclass, 0).map_err(|err| err.for_class(class))?;
    }
    for interface in &class.interfaces {
        check_signature(interface, 0).map_err(|err| err.for_class(class))?;
    }
    for method in &class.methods {
        if is_empty_some(&method.generic_signature) {
            return Err(invalid("empty method generic signature"));
        }
        for annotation in &method.annotations {
            check_annotation(annotation, 0).map_err(|err| err.for_class(class))?;
        }
        if let Some(default) = &method.default_value {
            check_constant(default, 0).map_err(|err| err.for_class(class))?;
        }
    }
    for field in &class.fields {
        if is_empty_some(&field.generic_signature) {
            return Err(invalid("empty field generic signature"));
        }
        if let Some(constant) = &field.constant {
            check_constant(constant, 0).map_err(|err| err.for_class(class))?;
        }
        for annotation in &field.annotations {
            check_annotation(annotation, 0).map_err(|err| err.for_class(class))?;
        }
    }
    for annotation in &class.annotations {
        check_annotation(annotation, 0).map_err(|err| err.for_class(class))?;
    }
    Ok(())
}

// An empty string is stored the same way as an absent one.
fn is_empty_some(value: &Option<String>) -> bool {
    value.as_deref() == Some("")
}

enum NestedError {
    Descriptor(IndexError),
    TooDeep,
}

impl NestedError {
    fn for_class(self, class: &ClassStub) -> IndexError {
        match self {
            NestedError::Descriptor(err) => err,
            NestedError::TooDeep => IndexError::InvalidClass {
                descriptor: class.descriptor.clone(),
                reason: "signatures or constants nested too deeply",
            },
        }
    }
}

type Nested = std::result::Result<(), NestedError>;

fn check_depth(depth: usize) -> Nested {
    if depth > MAX_NESTING {
        return Err(NestedError::TooDeep);
    }
    Ok(())
}

fn check_descriptor(descriptor: &str) -> Nested {
    descriptor::validate(descriptor).map_err(NestedError::Descriptor)
}

// Depths follow the reader: an argument sits one level below its
// signature, its bound one more.
fn check_signature(signature: &TypeSignatureStub, depth: usize) -> Nested {
    check_depth(depth)?;
    check_descriptor(&signature.descriptor)?;
    for argument in &signature.arguments {
        if let Some(bound) = &argument.bound {
            check_signature(bound, depth + 2)?;
        }
    }
    Ok(())
}

fn check_annotation(annotation: &AnnotationStub, depth: usize) -> Nested {
    check_depth(depth)?;
    check_descriptor(&annotation.descriptor)?;
    for pair in &annotation.values {
        check_constant(&pair.value, depth + 1)?;
    }
    Ok(())
}

fn check_constant(value: &ConstantValue, depth: usize) -> Nested {
    check_depth(depth)?;
    match value {
        ConstantValue::Class(signature) => check_signature(signature, depth + 1),
        ConstantValue::Enum { descriptor, .. } => check_descriptor(descriptor),
        ConstantValue::Array(elements) => elements
            .iter()
            .try_for_each(|element| check_constant(element, depth + 1)),
        ConstantValue::Annotation(annotation) => check_annotation(annotation, depth + 1),
        _ => Ok(()),
    }
}
