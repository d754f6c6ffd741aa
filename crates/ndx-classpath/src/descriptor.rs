use std::path::PathBuf;

/// A request to resolve one binary type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryTypeDescriptor {
    /// Classpath entry the type was found in: a class directory or an archive.
    pub location: PathBuf,
    /// Field descriptor of the type, e.g. `Lp/X;`.
    pub field_descriptor: String,
    /// Workspace-relative path of the artifact, for display.
    pub workspace_path: String,
    /// Resource path in the index: a class file path, or `archive.jar|p/X.class`.
    pub index_path: String,
}

/// Artifact queued for (re)indexing after a direct decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReindexRequest {
    pub location: PathBuf,
    pub index_path: String,
}

impl From<&BinaryTypeDescriptor> for ReindexRequest {
    fn from(descriptor: &BinaryTypeDescriptor) -> Self {
        Self {
            location: descriptor.location.clone(),
            index_path: descriptor.index_path.clone(),
        }
    }
}
