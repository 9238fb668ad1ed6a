//! Local-directory tile source.

use std::path::PathBuf;

use bytes::Bytes;
use tracing::debug;

use super::{CompletionSink, FetchCompletion, FetchError, TileFetcher};
use crate::coord::TileAddress;

/// Reads pre-rendered tiles from a local directory.
///
/// Expects the conventional `{root}/{level}/{x}/{y}.png` layout. A missing
/// file reports [`FetchError::NotFound`]; any other I/O failure is
/// [`FetchError::Io`].
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    /// Creates a fetcher rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The on-disk path for a tile address.
    pub fn path_for(&self, address: &TileAddress) -> PathBuf {
        self.root
            .join(address.level.to_string())
            .join(address.x.to_string())
            .join(format!("{}.png", address.y))
    }
}

impl TileFetcher for FileFetcher {
    fn name(&self) -> &str {
        "file"
    }

    fn start_fetch(&self, address: TileAddress, generation: u64, completions: CompletionSink) {
        let path = self.path_for(&address);
        tokio::spawn(async move {
            let result = match tokio::fs::read(&path).await {
                Ok(data) => {
                    debug!(tile = %address, path = %path.display(), bytes = data.len(), "Tile read from disk");
                    Ok(Bytes::from(data))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(FetchError::NotFound(address))
                }
                Err(e) => Err(FetchError::Io(e.to_string())),
            };
            completions.deliver(FetchCompletion { address, generation, result });
        });
    }
}
