use std::io::Read;
use std::path::Path;

use ndx_index::ARCHIVE_SEPARATOR;

use crate::error::BridgeError;

/// Reads the raw bytes behind a resource path: either a loose file or, for
/// `archive.jar|p/X.class`, one entry of a zip archive.
pub fn read_artifact(index_path: &str) -> Result<Vec<u8>, BridgeError> {
    match index_path.split_once(ARCHIVE_SEPARATOR) {
        Some((archive, entry)) => read_archive_entry(Path::new(archive), entry),
        None => Ok(std::fs::read(index_path)?),
    }
}

fn read_archive_entry(archive: &Path, entry: &str) -> Result<Vec<u8>, BridgeError> {
    let file = std::fs::File::open(archive)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive.by_name(entry)?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}
