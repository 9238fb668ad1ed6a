//! Deterministic in-process tile source for tests and demos.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tracing::debug;

use super::{CompletionSink, FetchCompletion, FetchError, TileFetcher};
use crate::coord::TileAddress;

/// Configuration for the synthetic tile source.
#[derive(Debug, Clone)]
pub struct SyntheticFetcherConfig {
    /// Simulated per-fetch latency.
    pub latency: Duration,
    /// Edge length of generated tiles in texels.
    pub tile_size: u32,
}

impl Default for SyntheticFetcherConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(5),
            tile_size: 64,
        }
    }
}

/// Generates PNG tiles locally with a flat color derived from the address.
///
/// Deterministic: the same address always yields the same payload, which
/// makes cache and pipeline behavior reproducible. Failures can be scripted
/// per address for exercising the retry path.
pub struct SyntheticFetcher {
    config: SyntheticFetcherConfig,
    /// Remaining scripted failures per address.
    failures: DashMap<TileAddress, u32>,
}

impl SyntheticFetcher {
    /// Creates a fetcher with default latency and tile size.
    pub fn new() -> Self {
        Self::with_config(SyntheticFetcherConfig::default())
    }

    /// Creates a fetcher with the given configuration.
    pub fn with_config(config: SyntheticFetcherConfig) -> Self {
        Self {
            config,
            failures: DashMap::new(),
        }
    }

    /// Scripts the next `times` fetches of `address` to fail.
    pub fn fail_next(&self, address: TileAddress, times: u32) {
        self.failures.insert(address, times);
    }

    /// Renders the deterministic payload for an address.
    pub fn generate(address: &TileAddress, tile_size: u32) -> Bytes {
        // Flat color keyed off the address so neighboring tiles differ.
        let r = (address.x.wrapping_mul(97) ^ u32::from(address.level)) as u8;
        let g = (address.y.wrapping_mul(57)) as u8;
        let b = ((address.x ^ address.y).wrapping_mul(31)) as u8;

        let mut img = RgbaImage::new(tile_size, tile_size);
        for pixel in img.pixels_mut() {
            *pixel = Rgba([r, g, b, 255]);
        }

        let mut buf = Cursor::new(Vec::new());
        PngEncoder::new(&mut buf)
            .write_image(&img, tile_size, tile_size, ExtendedColorType::Rgba8)
            .expect("in-memory PNG encoding cannot fail");
        Bytes::from(buf.into_inner())
    }

    fn take_scripted_failure(&self, address: &TileAddress) -> bool {
        if let Some(mut remaining) = self.failures.get_mut(address) {
            if *remaining > 0 {
                *remaining -= 1;
                return true;
            }
        }
        false
    }
}

impl Default for SyntheticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TileFetcher for SyntheticFetcher {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start_fetch(&self, address: TileAddress, generation: u64, completions: CompletionSink) {
        let latency = self.config.latency;
        let tile_size = self.config.tile_size;
        let fail = self.take_scripted_failure(&address);

        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let result = if fail {
                debug!(tile = %address, "Synthetic fetch failing as scripted");
                Err(FetchError::Injected(address))
            } else {
                Ok(Self::generate(&address, tile_size))
            };
            completions.deliver(FetchCompletion { address, generation, result });
        });
    }
}
