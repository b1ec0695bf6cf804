//! HomeGlow - home media and light controller.
//!
//! Starts the audio-reactive light show engine against the LAN lamps and
//! exposes a line-oriented supervisor on stdin, standing in for the HTTP
//! layer of the full deployment.

mod config;
mod logging_setup;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use homeglow_control::{CloudClient, LanConfig, LanTransport, ShowEngine, ShowMode};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "homeglow", about = "Audio-reactive light show controller")]
struct Args {
    /// Show mode: pulse, ambient or party
    mode: String,

    /// Lamp device id; repeat for each lamp (position matters)
    #[arg(long = "device", required = true)]
    devices: Vec<String>,

    /// Show intensity, 1-10
    #[arg(long, default_value_t = 7)]
    intensity: u8,

    /// Latency offset in milliseconds, -500..=500
    #[arg(long, default_value_t = 0)]
    latency_ms: i32,

    /// Path of a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let _log_guard = logging_setup::init(&config.log)?;

    info!("=== HomeGlow session started ===");

    let mode: ShowMode = args.mode.parse().context("invalid mode")?;
    let transport = Arc::new(LanTransport::new(LanConfig::default()));
    let cloud = if config.cloud_api_key.is_empty() {
        None
    } else {
        Some(CloudClient::new(config.cloud_api_key.clone())?)
    };

    let mut engine = ShowEngine::new(transport.clone(), config.pipe_path.clone());

    if let Err(e) = engine.start(mode, &args.devices, args.latency_ms, args.intensity) {
        // No lamps on the LAN: surface what the cloud account knows about
        // before giving up, so the operator can tell dead lamps from a
        // dead network segment.
        if let Some(cloud) = &cloud {
            match cloud.get_devices() {
                Ok(devices) => {
                    for d in devices {
                        info!("cloud knows device {} ({} {})", d.device, d.sku, d.device_name);
                    }
                }
                Err(cloud_err) => warn!("cloud device list failed: {cloud_err}"),
            }
        }
        return Err(e).context("failed to start show");
    }

    print_status(&engine)?;
    supervise(&mut engine, transport.as_ref(), cloud.as_ref())?;

    engine.stop();
    info!("=== HomeGlow session ended ===");
    Ok(())
}

/// Read supervisor commands from stdin until quit/EOF.
fn supervise(
    engine: &mut ShowEngine,
    transport: &LanTransport,
    cloud: Option<&CloudClient>,
) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let command = match parts.next() {
            Some(c) => c,
            None => continue,
        };

        let outcome = match (command, parts.next()) {
            ("quit", _) | ("exit", _) => break,
            ("status", _) => print_status(engine),
            ("mode", Some(value)) => value
                .parse::<ShowMode>()
                .map_err(Into::into)
                .and_then(|mode| engine.set_mode(mode).map_err(Into::into)),
            ("intensity", Some(value)) => parse_number(value).map(|level| {
                engine.set_intensity(level);
            }),
            ("latency", Some(value)) => parse_number(value)
                .and_then(|ms| engine.set_latency(ms).map_err(Into::into)),
            ("devices", _) => list_devices(transport, cloud),
            _ => {
                println!("commands: mode <m> | intensity <1-10> | latency <ms> | status | devices | quit");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("error: {e:#}");
        }
        io::stdout().flush().ok();
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("not a number: {value}"))
}

fn print_status(engine: &ShowEngine) -> Result<()> {
    let status = engine.status();
    println!("{}", serde_json::to_string(&status)?);
    Ok(())
}

fn list_devices(transport: &LanTransport, cloud: Option<&CloudClient>) -> Result<()> {
    match transport.discover(false) {
        Ok(devices) => {
            for d in &devices {
                println!("lan  {} {} {}", d.device_id, d.ip, d.sku);
            }
            if devices.is_empty() {
                println!("lan  (no lamps found)");
            }
        }
        Err(e) => println!("lan  discovery failed: {e}"),
    }

    if let Some(cloud) = cloud {
        match cloud.get_devices() {
            Ok(devices) => {
                for d in &devices {
                    println!("cloud  {} {} {}", d.device, d.sku, d.device_name);
                }
            }
            Err(e) => println!("cloud  device list failed: {e}"),
        }
    }
    Ok(())
}
