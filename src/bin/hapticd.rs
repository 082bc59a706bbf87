//! Haptics daemon
//!
//! Loads the engine config, starts audio output and drives the simulation
//! tick until Ctrl-C, then zeroes every DMX channel before exiting.
//!
//! ```text
//! hapticd [--config haptics.toml] [--system system.toml] [--wave NAME] [--list-devices]
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use haptic_engine::{
    audio::device::list_output_devices,
    config::{AppConfig, SystemOverride},
    effects::PlaySettings,
    HapticsContext,
};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    system: Option<PathBuf>,
    wave: Option<String>,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--system" => args.system = Some(iter.next().context("--system needs a path")?.into()),
            "--wave" => args.wave = Some(iter.next().context("--wave needs a name")?),
            "--list-devices" => args.list_devices = true,
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;

    if args.list_devices {
        println!("\n=== Available Output Devices ===");
        for device in list_output_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    ID: {}", device.id);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        return Ok(());
    }

    tracing::info!("Starting haptics daemon");

    let config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            tracing::warn!("No --config given, running with defaults");
            AppConfig::default()
        }
    };
    let system = match &args.system {
        Some(path) => SystemOverride::load(path)?,
        None => SystemOverride::discover(),
    };

    let mut context = HapticsContext::init(&config, system.as_ref());
    if let Err(e) = context.start_audio(&config) {
        tracing::error!("Audio output unavailable: {}", e);
    }

    let _demo = args.wave.as_ref().and_then(|wave| {
        tracing::info!("Playing demo wave {}", wave);
        context.play(PlaySettings::wave(wave.clone()).always_play())
    });

    let period = Duration::from_secs_f32(1.0 / config.tick_rate_hz);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_tick = Instant::now();
    let mut last_stats = Instant::now();

    tracing::info!("Running at {} Hz - press Ctrl+C to stop", config.tick_rate_hz);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f32();
                last_tick = now;
                context.tick(dt);

                if last_stats.elapsed() >= STATS_INTERVAL {
                    last_stats = Instant::now();
                    if let Some(stats) = context.dmx_stats() {
                        tracing::info!(
                            "Stats: {} DMX frames sent, {} failed, {} sounds",
                            stats.frames_sent,
                            stats.send_failures,
                            context.router().sound_count()
                        );
                    }
                    if let Some(output) = context.audio_output() {
                        tracing::info!(
                            "Audio: {} frames rendered, stream {}",
                            output.frames_rendered(),
                            if output.is_running() { "running" } else { "stopped" }
                        );
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    context.shutdown();
    Ok(())
}
