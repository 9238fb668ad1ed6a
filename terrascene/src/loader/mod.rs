//! Asynchronous tile data acquisition.
//!
//! A [`TileFetcher`] turns a tile address into raw payload bytes off the
//! layer thread. Completions are never delivered as callbacks on a foreign
//! thread: the fetcher posts a [`FetchCompletion`] message onto the layer
//! thread's completion channel, and the layer thread re-enters the
//! controller with it. Cancellation is best-effort: a worker is allowed to
//! run to completion, its result discarded by the controller's generation
//! check on arrival.
//!
//! Implementations:
//! - [`SyntheticFetcher`] - deterministic in-process generator (tests, demos)
//! - [`FileFetcher`] - local directory of pre-rendered tiles
//! - [`HttpFetcher`] - template-URL web source with memory and disk caches

mod file;
mod http;
mod synthetic;

pub use file::FileFetcher;
pub use http::{HttpClient, HttpFetcher, HttpFetcherConfig, ReqwestClient};
pub use synthetic::{SyntheticFetcher, SyntheticFetcherConfig};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::coord::TileAddress;

/// Errors from tile data acquisition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Filesystem-level failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// HTTP-level failure (status, transport, malformed URL).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The source has no tile at this address.
    #[error("Tile not found: {0}")]
    NotFound(TileAddress),

    /// The fetch exceeded its deadline.
    #[error("Fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Scripted failure from the synthetic fetcher.
    #[error("Injected failure for {0}")]
    Injected(TileAddress),
}

/// The result of one fetch, tagged with the generation it was issued under.
///
/// The controller compares `generation` against the node's current
/// generation before acting; a mismatch means the node was unloaded or
/// refreshed while this fetch was in flight and the payload is discarded.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    /// The tile this fetch was for.
    pub address: TileAddress,
    /// Generation the fetch was issued under.
    pub generation: u64,
    /// Payload bytes or the failure.
    pub result: Result<Bytes, FetchError>,
}

/// Thread-safe handle fetch workers use to post completions to the layer
/// thread.
///
/// Cheap to clone. Delivery to a shut-down engine is a silent no-op; there
/// is nobody left to care about the result.
#[derive(Debug, Clone)]
pub struct CompletionSink {
    tx: mpsc::UnboundedSender<FetchCompletion>,
}

impl CompletionSink {
    /// Wraps the sending half of the layer thread's completion channel.
    pub fn new(tx: mpsc::UnboundedSender<FetchCompletion>) -> Self {
        Self { tx }
    }

    /// Posts a completion, ignoring a closed channel.
    pub fn deliver(&self, completion: FetchCompletion) {
        let _ = self.tx.send(completion);
    }
}

/// Creates a completion channel pair.
pub fn completion_channel() -> (CompletionSink, mpsc::UnboundedReceiver<FetchCompletion>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionSink::new(tx), rx)
}

/// Asynchronous data-acquisition capability.
///
/// `start_fetch` must return quickly: implementations dispatch the real work
/// onto the async runtime (or a worker pool) and deliver the result through
/// the sink. Called only from the layer thread.
pub trait TileFetcher: Send + Sync + 'static {
    /// Short source name for logging ("synthetic", "file", "http").
    fn name(&self) -> &str;

    /// Begins fetching payload bytes for a tile.
    ///
    /// The eventual [`FetchCompletion`] must carry back `generation`
    /// unchanged.
    fn start_fetch(&self, address: TileAddress, generation: u64, completions: CompletionSink);

    /// Best-effort cancellation of an in-flight fetch.
    ///
    /// Implementations may ignore this entirely; correctness rests on the
    /// generation check, not on cancellation.
    fn cancel_fetch(&self, _address: TileAddress) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_channel_roundtrip() {
        let (sink, mut rx) = completion_channel();
        sink.deliver(FetchCompletion {
            address: TileAddress::root(),
            generation: 3,
            result: Ok(Bytes::from_static(b"payload")),
        });

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.address, TileAddress::root());
        assert_eq!(completion.generation, 3);
        assert_eq!(completion.result.unwrap(), Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_delivery_to_closed_channel_is_silent() {
        let (sink, rx) = completion_channel();
        drop(rx);
        sink.deliver(FetchCompletion {
            address: TileAddress::root(),
            generation: 0,
            result: Err(FetchError::NotFound(TileAddress::root())),
        });
    }
}
