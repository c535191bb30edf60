//! Face Detector/Embedder (C4) and Vector Index (C5).

pub mod detector;
pub mod index;

pub use detector::{FaceAnalysis, FaceEmbedder, OnnxFaceEmbedder, StubFaceEmbedder};
pub use index::{IndexStats, VectorIndex};

use std::fs;
use std::io::Write as _;
use std::path::Path;

use facegate_core::Error;

/// Write `contents` to `path` via a sibling temp file then rename.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let tmp_path = {
        let mut p = path.to_path_buf();
        let file_name = p
            .file_name()
            .map(|n| format!("{}.tmp", n.to_string_lossy()))
            .unwrap_or_else(|| "facegate.tmp".to_string());
        p.set_file_name(file_name);
        p
    };

    let mut file = fs::File::create(&tmp_path)
        .map_err(|e| Error::Internal(anyhow::anyhow!("creating temp file {tmp_path:?}: {e}")))?;
    file.write_all(contents)
        .map_err(|e| Error::Internal(anyhow::anyhow!("writing temp file {tmp_path:?}: {e}")))?;
    file.sync_all()
        .map_err(|e| Error::Internal(anyhow::anyhow!("syncing temp file {tmp_path:?}: {e}")))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Internal(anyhow::anyhow!("renaming into place {path:?}: {e}")))?;
    Ok(())
}
