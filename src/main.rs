//! Optical Barcode CLI
//!
//! Command-line interface for running a scan session against the
//! synthetic camera (default) or a native camera (`--native`, feature
//! `camera`), and for validating manually typed codes.

use clap::Parser;
use optical_barcode::{
    capture::{CameraCapability, SyntheticCamera},
    config::FileConfig,
    metrics::{MetricsRegistry, MetricsSnapshot},
    session::{ScanError, ScanOptions, ScanResult, ScanSession, SessionStats},
};
use rand_core::{OsRng, RngCore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const DEMO_CODE: &str = "4006381333931";

/// Scan barcodes from a live or synthetic camera
#[derive(Parser, Debug)]
#[command(name = "optical-barcode")]
#[command(version)]
#[command(about = "Scan barcodes from a live or synthetic camera", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Validate a typed code and print it, without opening a camera
    #[arg(long, value_name = "CODE", conflicts_with = "demo")]
    manual: Option<String>,

    /// Code rendered by the synthetic camera
    #[arg(long, value_name = "CODE")]
    demo: Option<String>,

    /// Keep scanning after each detection
    #[arg(long)]
    continuous: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    duration: u64,

    /// Use the system camera instead of the synthetic one
    #[cfg(feature = "camera")]
    #[arg(long, conflicts_with = "demo")]
    native: bool,

    /// Metrics server port (0 to disable; overrides the config file)
    #[arg(long, value_name = "PORT")]
    metrics_port: Option<u16>,
}

enum Event {
    Result(ScanResult),
    Error(ScanError),
    Interrupt,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Optical Barcode Scanner v{}", optical_barcode::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => FileConfig::default(),
    };
    if args.continuous {
        config.session.continuous = true;
    }
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }

    let outcome = match &args.manual {
        Some(code) => manual(&config, code),
        None => scan(&args, &config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn manual(config: &FileConfig, code: &str) -> Result<(), ScanError> {
    let session = ScanSession::builder(Arc::new(SyntheticCamera::new()))
        .file_config(config)
        .build()?;
    let result = session.submit_manual(code)?;
    println!("{}:{}", result.format, result.code);
    Ok(())
}

fn camera(args: &Args) -> Arc<dyn CameraCapability> {
    if let Some(camera) = native_camera(args) {
        return camera;
    }

    let code = args.demo.as_deref().unwrap_or(DEMO_CODE);
    info!(code, "Using the synthetic camera");
    let camera = SyntheticCamera::new().with_noise(24, OsRng.next_u64());
    camera.show(code);
    Arc::new(camera)
}

#[cfg(feature = "camera")]
fn native_camera(args: &Args) -> Option<Arc<dyn CameraCapability>> {
    if !args.native {
        return None;
    }
    info!("Using the system camera");
    Some(Arc::new(optical_barcode::capture::NativeCamera::new()))
}

#[cfg(not(feature = "camera"))]
fn native_camera(_args: &Args) -> Option<Arc<dyn CameraCapability>> {
    None
}

fn scan(args: &Args, config: &FileConfig) -> Result<(), ScanError> {
    let session = ScanSession::builder(camera(args))
        .file_config(config)
        .build()?;
    let continuous = config.session.continuous;

    let (tx, rx) = mpsc::channel();
    let interrupt = tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt.send(Event::Interrupt);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let results = Mutex::new(tx.clone());
    let errors = Mutex::new(tx);
    let options = ScanOptions::from_config(&config.session, config.camera.facing, move |result| {
        if let Ok(tx) = results.lock() {
            let _ = tx.send(Event::Result(result.clone()));
        }
    })
    .on_error(move |error| {
        if let Ok(tx) = errors.lock() {
            let _ = tx.send(Event::Error(error.clone()));
        }
    });

    let exporter = Exporter::start(config.output.metrics_port);

    if let Err(e) = session.open(options) {
        if e.kind().is_user_actionable() {
            warn!("Camera unavailable; use --manual <CODE> to enter a code by hand");
        }
        exporter.shutdown(&session.stats());
        return Err(e);
    }

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut accepted = 0u64;
    loop {
        exporter.update(&session.stats());
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            info!("Scan duration elapsed");
            break;
        };
        match rx.recv_timeout(remaining.min(Duration::from_secs(1))) {
            Ok(Event::Result(result)) => {
                accepted += 1;
                println!("{}:{}", result.format, result.code);
                if !continuous {
                    break;
                }
            }
            Ok(Event::Error(e)) => {
                error!(kind = ?e.kind(), "{}", e);
                break;
            }
            Ok(Event::Interrupt) => {
                info!("Interrupted");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    session.close();
    let stats = session.stats();
    info!(
        accepted,
        frames = stats.frames_sampled,
        candidates = stats.scan_count,
        rejected = stats.rejected,
        debounced = stats.debounced,
        "Session closed"
    );
    exporter.shutdown(&stats);
    Ok(())
}

/// Serves metrics over HTTP on a background runtime.
#[cfg(feature = "metrics")]
struct Exporter {
    running: Option<RunningExporter>,
}

#[cfg(feature = "metrics")]
struct RunningExporter {
    state: Arc<tokio::sync::RwLock<optical_barcode::metrics::MetricsState>>,
    stop: tokio::sync::oneshot::Sender<()>,
    worker: std::thread::JoinHandle<()>,
}

#[cfg(feature = "metrics")]
impl Exporter {
    fn start(port: u16) -> Self {
        use optical_barcode::metrics::{MetricsServer, MetricsServerConfig};

        if port == 0 {
            return Self { running: None };
        }
        debug!(port, "Starting metrics exporter");
        let registry = match MetricsRegistry::new() {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                return Self { running: None };
            }
        };
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let state = server.state();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

        let spawned = std::thread::Builder::new()
            .name("metrics".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start metrics runtime: {}", e);
                        return;
                    }
                };
                let shutdown = async move {
                    let _ = stopped.await;
                };
                if let Err(e) = runtime.block_on(server.run_until(shutdown)) {
                    error!("Metrics server failed: {}", e);
                }
            });

        match spawned {
            Ok(worker) => Self {
                running: Some(RunningExporter {
                    state,
                    stop,
                    worker,
                }),
            },
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                Self { running: None }
            }
        }
    }

    fn update(&self, stats: &SessionStats) {
        if let Some(running) = &self.running {
            running
                .state
                .blocking_write()
                .update(&MetricsSnapshot::from_stats(stats));
        }
    }

    fn shutdown(self, stats: &SessionStats) {
        self.update(stats);
        if let Some(running) = self.running {
            let _ = running.stop.send(());
            if running.worker.join().is_err() {
                warn!("Metrics thread panicked");
            }
        }
    }
}

/// Keeps metrics in-process and logs them at exit.
#[cfg(not(feature = "metrics"))]
struct Exporter {
    registry: Option<MetricsRegistry>,
}

#[cfg(not(feature = "metrics"))]
impl Exporter {
    fn start(port: u16) -> Self {
        if port != 0 {
            debug!(port, "Built without the metrics feature; not serving metrics");
        }
        Self {
            registry: MetricsRegistry::new().ok(),
        }
    }

    fn update(&self, stats: &SessionStats) {
        if let Some(registry) = &self.registry {
            registry.update(&MetricsSnapshot::from_stats(stats));
        }
    }

    fn shutdown(self, stats: &SessionStats) {
        self.update(stats);
        if let Some(Ok(text)) = self.registry.as_ref().map(MetricsRegistry::encode) {
            debug!("Final metrics:\n{}", text);
        }
    }
}
