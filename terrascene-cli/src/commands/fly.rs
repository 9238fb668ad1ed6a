//! The `fly` command: drive the engine along a scripted camera path.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use terrascene::app::{EngineConfig, EngineHandle, GlobeEngine};
use terrascene::builder::ImageTileBuilder;
use terrascene::events::TileEvent;
use terrascene::ident::IdentifierAllocator;
use terrascene::loader::{FileFetcher, HttpFetcher, HttpFetcherConfig, SyntheticFetcher, TileFetcher};
use terrascene::view::ViewState;

/// Arguments for the `fly` command.
#[derive(Debug, Args)]
pub struct FlyArgs {
    /// Start latitude in degrees.
    #[arg(long, default_value_t = 47.6)]
    pub from_lat: f64,

    /// Start longitude in degrees.
    #[arg(long, default_value_t = -122.3)]
    pub from_lon: f64,

    /// End latitude in degrees.
    #[arg(long, default_value_t = 40.7)]
    pub to_lat: f64,

    /// End longitude in degrees.
    #[arg(long, default_value_t = -74.0)]
    pub to_lon: f64,

    /// Detail level to request along the path.
    #[arg(long, default_value_t = 8)]
    pub level: u8,

    /// View span in degrees (both axes).
    #[arg(long, default_value_t = 2.0)]
    pub span: f64,

    /// Number of camera ticks to fly.
    #[arg(long, default_value_t = 300)]
    pub ticks: u32,

    /// Milliseconds between ticks.
    #[arg(long, default_value_t = 33)]
    pub tick_interval_ms: u64,

    /// Tile source URL template with {level}/{x}/{y} placeholders.
    /// Omit to use the deterministic synthetic source.
    #[arg(long, conflicts_with = "dir")]
    pub url: Option<String>,

    /// Local tile directory laid out as {level}/{x}/{y}.png.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// On-disk byte cache directory for the HTTP source.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Engine configuration file (JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runs the scripted flight and prints a telemetry line per second.
pub fn run(args: FlyArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let fetcher: Arc<dyn TileFetcher> = match (&args.url, &args.dir) {
        (Some(url), _) => {
            let mut http = HttpFetcherConfig::new(url.clone());
            http.disk_cache_dir = args.cache_dir.clone();
            Arc::new(HttpFetcher::new(http)?)
        }
        (None, Some(dir)) => Arc::new(FileFetcher::new(dir.clone())),
        (None, None) => Arc::new(SyntheticFetcher::new()),
    };
    let builder = Arc::new(ImageTileBuilder::new(Arc::new(IdentifierAllocator::new())));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let engine = GlobeEngine::start(config, fetcher, builder)?;
        fly(engine, &args).await
    })
}

async fn fly(mut engine: EngineHandle, args: &FlyArgs) -> Result<(), Box<dyn Error>> {
    info!(
        from = format!("{:.3},{:.3}", args.from_lat, args.from_lon),
        to = format!("{:.3},{:.3}", args.to_lat, args.to_lon),
        level = args.level,
        ticks = args.ticks,
        "Starting flight"
    );

    let interval = Duration::from_millis(args.tick_interval_ms);
    let report_every = (1000 / args.tick_interval_ms.max(1)).max(1) as u32;
    let mut failures: u64 = 0;

    for tick in 0..args.ticks {
        let t = f64::from(tick) / f64::from(args.ticks.max(1));
        let view = ViewState::new(
            args.from_lat + (args.to_lat - args.from_lat) * t,
            args.from_lon + (args.to_lon - args.from_lon) * t,
            args.span,
            args.span,
            args.level,
        );

        if !engine.layer.tick(view) {
            return Err("engine stopped unexpectedly".into());
        }

        while let Ok(event) = engine.events.try_recv() {
            if let TileEvent::LoadFailed { address, error } = event {
                failures += 1;
                tracing::warn!(tile = %address, %error, "Tile failed");
            }
        }

        if tick % report_every == 0 {
            println!("[{:>4}] {}", tick, engine.snapshot());
        }

        tokio::time::sleep(interval).await;
    }

    // Let in-flight work settle before the final report.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let snapshot = engine.snapshot();
    println!("final: {}", snapshot);
    if failures > 0 {
        println!("tile failures observed: {}", failures);
    }

    engine.shutdown().await;
    Ok(())
}
