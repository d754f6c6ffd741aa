//! Bridge between classpath artifacts on disk and the type index.
//!
//! [`BinaryTypeFactory`] answers "give me `Lp/X;` from `lib.jar`" from the
//! index when the artifact is fully indexed and unchanged, and otherwise
//! decodes the artifact bytes with a caller-supplied [`ClassDecoder`] and
//! queues the artifact for reindexing. Index corruption triggers a single
//! rebuild attempt; if that does not help, indexed reads are disabled and
//! every lookup decodes directly.

mod artifact;
mod bridge;
mod descriptor;
mod error;
mod view;

pub use artifact::read_artifact;
pub use bridge::{BinaryType, BinaryTypeFactory, IndexBinaryType};
pub use descriptor::{BinaryTypeDescriptor, ReindexRequest};
pub use error::{BoxError, BridgeError};
pub use view::{BinaryTypeView, ClassDecoder};
