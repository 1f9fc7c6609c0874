//! Gridcast - headless player and media tools.
//!
//! `play` runs a full engine with one screen and one console observer that
//! mirrors the grid, logging playback stats once per second.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use gridcast_color::{Palette, PaletteMapper};
use gridcast_core::{AspectRatio, CellGrid, Facing, Location};
use gridcast_engine::{Engine, EngineConfig, PlayOptions, ScreenSpec};
use gridcast_media::MediaProbe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Args, Command};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = args.config.clone().unwrap_or_else(EngineConfig::default_path);
    let config = EngineConfig::load_or_default(args.config.as_deref())
        .with_context(|| format!("loading {}", config_path.display()))?;

    match args.command {
        Command::Probe { file } => probe(&file),
        Command::Palette { file } => print_palette(file.as_deref().or(config.palette.as_deref())),
        Command::InitConfig => {
            config.save(&config_path)?;
            println!("{}", config_path.display());
            Ok(())
        }
        Command::Play {
            reference,
            width,
            height,
            aspect,
            tiles,
            fps,
            looping,
            limit,
        } => {
            let mut config = config;
            if let Some(fps) = fps {
                config.target_fps = fps;
            }
            let (width, height) = match aspect {
                Some(ratio) => {
                    let ratio: AspectRatio = ratio.parse().map_err(anyhow::Error::msg)?;
                    ratio.cell_dimensions(tiles)
                }
                None => (width, height),
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("gridcast")
                .build()?;
            runtime.block_on(play(
                config,
                &reference,
                width,
                height,
                PlayOptions::default().looping(looping),
                limit.map(Duration::from_secs),
            ))
        }
    }
}

fn probe(file: &Path) -> Result<()> {
    let probe = MediaProbe::probe(file)?;
    println!("{}", serde_json::to_string_pretty(&probe)?);
    match probe.source_info() {
        Ok(info) => info!(
            duration = %info.duration.to_clock_string(),
            fps = %info.frame_rate,
            frames = info.frame_count(),
            "Playable"
        ),
        Err(e) => warn!(error = %e, "Not playable"),
    }
    Ok(())
}

fn print_palette(file: Option<&Path>) -> Result<()> {
    let palette = match file {
        Some(path) => Palette::load(path)?,
        None => Palette::builtin(),
    };
    println!("{}", serde_json::to_string_pretty(palette.entries())?);
    Ok(())
}

async fn play(
    config: EngineConfig,
    reference: &str,
    width: u32,
    height: u32,
    options: PlayOptions,
    limit: Option<Duration>,
) -> Result<()> {
    let engine = Arc::new(Engine::new(config)?);
    info!(
        palette = PaletteMapper::global().palette().len(),
        width, height, "Engine ready"
    );

    let origin = Location::new("console", 0.0, 0.0, 0.0);
    let screen = engine.create_screen(ScreenSpec::new(origin.clone(), width, height, Facing::North).named("console"))?;
    let (_observer, events) = engine.connect_observer(Some(origin))?;
    let ticker = engine.spawn_ticker();

    let session = engine.play(screen, reference, options).await?;
    info!(session = %session, reference, "Playing");

    let started = Instant::now();
    let mut mirror = CellGrid::default();
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let mut received = 0u64;
    let mut rejected = 0u64;
    loop {
        report.tick().await;
        for event in events.try_iter() {
            received += 1;
            if !event.apply_to(&mut mirror) {
                rejected += 1;
            }
        }

        let detail = engine.info(screen)?;
        if let Some(stats) = &detail.stats {
            info!(
                state = ?detail.summary.state,
                position = detail.position_ms.unwrap_or_default(),
                decoded = stats.frames_decoded,
                published = stats.frames_published,
                full = stats.full_frames,
                delta = stats.delta_frames,
                dropped = stats.frames_dropped,
                decode_ms = stats.avg_decode_ms,
                received,
                "Stats"
            );
        }
        if detail.summary.session.is_none() {
            if let Some(last) = detail.last_session {
                match last.error {
                    Some(error) => warn!(%error, "Playback failed"),
                    None => info!(frames = last.stats.frames_published, "Playback finished"),
                }
            }
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            info!("Time limit reached");
            break;
        }
    }

    ticker.abort();
    let engine_for_shutdown = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || engine_for_shutdown.shutdown()).await?;
    if rejected > 0 {
        warn!(rejected, "Deltas arrived before a full frame");
    }
    Ok(())
}
