//! catwatchd - motion-gated cat detection daemon
//!
//! This daemon:
//! 1. Opens the camera, PIR sensor, buzzer and classifier (any failure is fatal)
//! 2. Runs the motion monitor in the background
//! 3. Serves the control page, motion status and the annotated MJPEG stream
//! 4. Sounds the buzzer for every target detection while the buzzer is enabled

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use catwatch::{Devices, Service, ServiceConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Motion-gated cat detection with a live stream")]
struct Args {
    /// TOML config file. Environment overrides still apply on top.
    #[arg(long, env = "CATWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address, overriding the config file.
    #[arg(long)]
    addr: Option<String>,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let mut cfg = ServiceConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        cfg.api_addr = addr;
    }
    log::info!(
        "catwatchd {} starting (target class '{}')",
        env!("CARGO_PKG_VERSION"),
        cfg.target_class
    );

    let devices = match Devices::open(&cfg) {
        Ok(devices) => devices,
        Err(err) => {
            log::error!("startup failed: {:#}", err);
            return Err(err);
        }
    };
    let handle = Service::start(&cfg, devices)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("catwatchd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    handle.stop()?;

    Ok(())
}
