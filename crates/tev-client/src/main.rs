//! `tev-push`: drive a running tev instance from the command line.
//!
//! # Usage
//!
//! ```text
//! tev-push [OPTIONS] <COMMAND>
//!
//! Commands:
//!   open         Ask tev to load image files from its own disk
//!   reload       Ask tev to re-read previously opened files
//!   close        Close images by name
//!   pattern      Stream a generated two-layer test image, row band by row band
//!   init-config  Write the effective configuration to the config file
//!
//! Options:
//!   --host <HOST>      tev host [env: TEV_HOST]
//!   --port <PORT>      tev IPC port [env: TEV_PORT]
//!   --config <PATH>    Config file [env: TEV_CONFIG]
//!   --grab-focus       Raise the tev window for created and opened images
//!   --budget <FLOATS>  Samples per update packet
//! ```
//!
//! Precedence, highest first: command-line flag, environment variable,
//! config file, built-in default. `RUST_LOG` overrides the configured
//! `log_level`.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tev_client::config::{config_file_path, load_config_from, save_config_to};
use tev_client::{ClientConfig, Session};
use tev_core::{FloatImage, Layer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Push images and commands to the tev HDR viewer over its IPC port.
#[derive(Debug, Parser)]
#[command(name = "tev-push", version)]
struct Cli {
    /// Hostname or IP address tev listens on.
    #[arg(long, env = "TEV_HOST")]
    host: Option<String>,

    /// TCP port of tev's IPC listener.
    #[arg(long, env = "TEV_PORT")]
    port: Option<u16>,

    /// Configuration file; defaults to the platform config directory.
    #[arg(long, env = "TEV_CONFIG")]
    config: Option<PathBuf>,

    /// Bring the tev window to the front for created and opened images.
    #[arg(long)]
    grab_focus: bool,

    /// Maximum `f32` samples per UpdateImage packet.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    budget: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask tev to load image files from its own file system.
    Open {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Ask tev to re-read files it opened earlier.
    Reload {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Close images by name, whoever created them.
    Close {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Stream a generated test image with a `color` (RGB) and a `depth` (Y) layer.
    Pattern {
        /// Image name shown in tev.
        #[arg(long, default_value = "tev-push pattern")]
        name: String,

        #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
        width: u32,

        #[arg(long, default_value_t = 360, value_parser = clap::value_parser!(u32).range(1..))]
        height: u32,

        /// Number of pushes; each one reveals another band of rows.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        frames: u32,

        /// Pause between pushes in milliseconds.
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
    /// Write the effective configuration to the config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// The config file in use, if one can be located.
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| config_file_path().ok())
    }

    /// Applies flag and environment overrides on top of the file settings.
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if self.grab_focus {
            config.session.grab_focus = true;
        }
        if let Some(budget) = self.budget {
            config.session.budget_floats = budget as usize;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let mut config = match &config_path {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    cli.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    if let Command::InitConfig { force } = cli.command {
        let path = config_path.context("no config path: pass --config or set TEV_CONFIG")?;
        if path.exists() && !force {
            anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
        }
        save_config_to(&config, &path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        info!(path = %path.display(), "wrote configuration");
        return Ok(());
    }

    let mut session = Session::connect_with(
        &config.connection.host,
        config.connection.port,
        config.session_config(),
    )
    .context("could not reach tev; is it running?")?;

    match cli.command {
        Command::Open { paths } => {
            for path in &paths {
                session.open(path)?;
            }
        }
        Command::Reload { paths } => {
            for path in &paths {
                session.reload(path)?;
            }
        }
        Command::Close { names } => {
            for name in &names {
                session.close(name)?;
            }
        }
        Command::Pattern {
            name,
            width,
            height,
            frames,
            interval_ms,
        } => run_pattern(
            &mut session,
            &name,
            width as usize,
            height as usize,
            frames,
            Duration::from_millis(interval_ms),
        )?,
        Command::InitConfig { .. } => {}
    }

    session.disconnect()?;
    Ok(())
}

// ── Test pattern ──────────────────────────────────────────────────────────────

/// Registers a two-layer image and pushes it `frames` times, revealing a
/// larger band of rows each time the way a progressive renderer would.
fn run_pattern(
    session: &mut Session,
    name: &str,
    width: usize,
    height: usize,
    frames: u32,
    interval: Duration,
) -> anyhow::Result<()> {
    let color = Arc::new(RwLock::new(FloatImage::new(width, height, 3)));
    let depth = Arc::new(RwLock::new(FloatImage::new(width, height, 1)));

    session.close(name)?;
    session.register(
        name,
        vec![
            Layer::new("color", color.clone()),
            Layer::new("depth", depth.clone()),
        ],
    )?;

    let mut rows_done = 0;
    for frame in 0..frames {
        let target = height * (frame as usize + 1) / frames as usize;
        {
            let mut color = color.write().unwrap_or_else(PoisonError::into_inner);
            let mut depth = depth.write().unwrap_or_else(PoisonError::into_inner);
            for row in rows_done..target {
                for col in 0..width {
                    let [r, g, b, z] = pattern_sample(col, row, width, height);
                    color.set_pixel(col, row, &[r, g, b]);
                    depth.set(col, row, 0, z);
                }
            }
        }
        rows_done = target;

        session.push(name)?;
        info!(frame = frame + 1, frames, rows = rows_done, "pushed pattern");

        if frame + 1 < frames {
            thread::sleep(interval);
        }
    }
    Ok(())
}

/// Gradient with an 8x8 checker overlay, plus distance from the centre.
fn pattern_sample(col: usize, row: usize, width: usize, height: usize) -> [f32; 4] {
    let u = (col as f32 + 0.5) / width as f32;
    let v = (row as f32 + 0.5) / height as f32;
    let checker = if (col * 8 / width + row * 8 / height) % 2 == 0 {
        1.0
    } else {
        0.25
    };
    let distance = ((u - 0.5).powi(2) + (v - 0.5).powi(2)).sqrt();
    [u * checker, v * checker, (1.0 - u) * checker, distance]
}
