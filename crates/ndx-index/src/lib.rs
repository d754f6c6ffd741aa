//! Java type index on top of `ndx-storage`.
//!
//! This crate defines the record kinds stored for compiled Java classes and
//! the query surface over them:
//! - [`schema`]: node tags, record layouts and destruct hooks
//! - [`nodes`]: typed views of records, borrowed from a lock guard
//! - [`JavaIndex`]: descriptor/simple-name/path lookups, staleness checks
//!   and deletion
//! - the indexer ([`JavaIndex::index_resource`]), which writes pre-decoded
//!   [`ClassStub`]s and supersedes older scans of the same path
//!
//! ## Reference counting
//! Every record that names a type (a declaration, a signature, an
//! annotation, an enum constant, an enclosing-type link) holds one reference
//! on its [`TypeIdRec`]. Ids are deleted when the last reference goes, so
//! removing the only resource declaring `Lp/X;` also removes `Lp/X;` from
//! [`JavaIndex::find_type`].

mod config;
mod descriptor;
mod error;
mod fingerprint;
mod indexer;
mod java_index;
pub mod nodes;
pub mod schema;
mod stubs;

pub use config::{IndexConfig, DEFAULT_FILE_NAME, INDEX_DIR_ENV};
pub use descriptor::{binary_name, simple_name};
pub use error::{ConfigError, IndexError, Result};
pub use fingerprint::{backing_file, Fingerprint, FingerprintCache, Freshness, ARCHIVE_SEPARATOR};
pub use indexer::IndexOutcome;
pub use java_index::JavaIndex;
pub use nodes::{
    AnnotationRec, AnnotationValueRec, ConstantRec, FieldRec, JavaNode, MethodRec, ResourceRec, SignatureRec,
    TypeArgumentRec, TypeIdRec, TypeRec,
};
pub use stubs::{
    AnnotationStub, AnnotationValueStub, ClassStub, ConstantValue, FieldStub, MethodStub, TypeArgumentStub,
    TypeSignatureStub, Wildcard,
};
pub use tokio_util::sync::CancellationToken;
