//! Extraction of the archive stored in controller code memory

use std::io::{Cursor, Read};

use crate::error::{Result, ScgiSrvError};

/// Return the content of the first entry of a zip archive
pub fn unzip_first(data: &[u8]) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    if archive.is_empty() {
        return Err(ScgiSrvError::frame("alc.zip: empty archive"));
    }
    let mut entry = archive.by_index(0)?;
    let mut out = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut out)?;
    Ok(out)
}

/// `unzip_first` on the blocking pool
pub async fn unzip(data: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || unzip_first(&data))
        .await
        .map_err(|e| ScgiSrvError::internal(format!("unzip task failed: {e}")))?
}
