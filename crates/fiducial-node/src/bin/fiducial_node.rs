use clap::Parser;
use crossbeam_channel::bounded;
use fiducial_node::{App, ConfigError, NodeConfig, NodeError};
use log::LevelFilter;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Detect fiducial markers in a replayed camera feed and publish the
/// annotated frames and detections to filesystem topics.
#[derive(Parser, Debug)]
#[command(name = "fiducial-node", version, about)]
struct Cli {
    /// JSON node configuration; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON code table of the marker family.
    #[arg(long)]
    dictionary: Option<PathBuf>,
    /// Camera calibration store (cameraMatrix, dist_coeffs, cameraResolution).
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Processing cycles per second.
    #[arg(long)]
    rate: Option<f64>,
    /// Marker side length in metres.
    #[arg(long)]
    marker_length: Option<f64>,
    /// Root directory of the filesystem topics.
    #[arg(long)]
    transport_root: Option<PathBuf>,
    #[arg(long)]
    input_topic: Option<String>,
    #[arg(long)]
    debug_topic: Option<String>,
    #[arg(long)]
    fiducials_topic: Option<String>,
    /// Stop after this many seconds; run until killed otherwise.
    #[arg(long)]
    duration_secs: Option<f64>,
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
    /// JSON log lines (builds with the `tracing` feature).
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn node_config(&self) -> Result<NodeConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => NodeConfig::load_json(path)?,
            None => NodeConfig::default(),
        };
        if let Some(v) = &self.dictionary {
            cfg.dictionary_path = Some(v.clone());
        }
        if let Some(v) = &self.calibration {
            cfg.calibration_path = Some(v.clone());
        }
        if let Some(v) = self.rate {
            cfg.rate_hz = v;
        }
        if let Some(v) = self.marker_length {
            cfg.marker_length = v;
        }
        if let Some(v) = &self.transport_root {
            cfg.transport_root = v.clone();
        }
        if let Some(v) = &self.input_topic {
            cfg.topics.input = v.clone();
        }
        if let Some(v) = &self.debug_topic {
            cfg.topics.debug_image = v.clone();
        }
        if let Some(v) = &self.fiducials_topic {
            cfg.topics.fiducials = v.clone();
        }
        Ok(cfg)
    }

    fn duration(&self) -> Result<Option<Duration>, ConfigError> {
        self.duration_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::NotPositive {
                    field: "duration_secs",
                    value: secs,
                })
            })
            .transpose()
    }
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::builder()
            .with_max_level(cli.log_level)
            .init();
        fiducial_node::core::init_tracing(cli.log_level, cli.json_logs);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = fiducial_node::core::init_with_level(cli.log_level);
        if cli.json_logs {
            log::warn!("--json-logs needs the `tracing` feature; using plain logs");
        }
    }
}

fn run(cli: &Cli) -> Result<(), NodeError> {
    let config = cli.node_config()?;
    let duration = cli.duration()?;
    let app = App::from_config(&config)?;

    let (stop_tx, stop_rx) = bounded::<()>(1);
    if let Some(d) = duration {
        let tx = stop_tx.clone();
        thread::spawn(move || {
            thread::sleep(d);
            let _ = tx.send(());
        });
    }

    let stats = app.run(&stop_rx)?;
    drop(stop_tx);
    log::debug!("final stats: {stats:?}");
    Ok(())
}

fn main() -> Result<(), NodeError> {
    let cli = Cli::parse();
    init_logging(&cli);
    run(&cli).inspect_err(|err| log::error!("{err}"))
}
