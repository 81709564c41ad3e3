use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mic_check::config::DEFAULT_CONFIG_PATH;
use mic_check::{
    create_router, AppState, Config, MediaPlatform, SessionController, SessionObserver,
    SessionPhase, StatusBoard, SyntheticPlatform,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mic-check")]
#[command(about = "Verify a microphone: live level, spectrum and a recorded sample")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Media backend
    #[arg(short, long, value_enum, default_value = "synthetic")]
    backend: Backend,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// Software tone generator
    Synthetic,
    /// Real microphones (needs the host-audio feature)
    Host,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,
    /// List input devices
    Devices,
    /// Run one headless test and save the recording
    Run {
        /// Test duration in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Device id (default: platform default)
        #[arg(short, long)]
        device: Option<String>,

        /// Directory for the recorded sample
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load(DEFAULT_CONFIG_PATH)?,
    };

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.service.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let platform = create_platform(cli.backend, &cfg)?;
    let status = Arc::new(StatusBoard::new());
    let observer: Arc<dyn SessionObserver> = status.clone();
    let controller = SessionController::new(platform, observer, cfg.controller_options());

    match cli.command {
        Command::Serve => serve(&cfg, controller, status).await,
        Command::Devices => list_devices(&controller).await,
        Command::Run {
            seconds,
            device,
            output,
        } => run_test(&controller, seconds, device, output).await,
    }
}

fn create_platform(backend: Backend, cfg: &Config) -> Result<Arc<dyn MediaPlatform>> {
    match backend {
        Backend::Synthetic => Ok(Arc::new(SyntheticPlatform::new(cfg.synthetic.clone()))),
        #[cfg(feature = "host-audio")]
        Backend::Host => Ok(Arc::new(mic_check::platform::CpalPlatform::new())),
        #[cfg(not(feature = "host-audio"))]
        Backend::Host => anyhow::bail!("mic-check was built without the host-audio feature"),
    }
}

async fn serve(
    cfg: &Config,
    controller: SessionController,
    status: Arc<StatusBoard>,
) -> Result<()> {
    if let Err(e) = controller.load_devices().await {
        warn!("Initial device load failed: {}", e);
    }

    let app = create_router(AppState::new(controller.clone(), status));
    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    controller.shutdown().await;
    Ok(())
}

async fn list_devices(controller: &SessionController) -> Result<()> {
    let devices = controller
        .load_devices()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if devices.is_empty() {
        println!("No microphones found");
        return Ok(());
    }

    for (index, device) in devices.iter().enumerate() {
        println!(
            "{}{}  {}",
            if device.is_default { "* " } else { "  " },
            device.id,
            device.display_label(index)
        );
    }
    Ok(())
}

async fn run_test(
    controller: &SessionController,
    seconds: u64,
    device: Option<String>,
    output: PathBuf,
) -> Result<()> {
    if let Err(e) = controller.load_devices().await {
        warn!("Device load failed: {}", e);
    }
    controller.select_device(device).await;

    let metadata = controller
        .start()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    for second in 1..=seconds {
        ticker.tick().await;
        if controller.phase() != SessionPhase::Active {
            break;
        }
        info!("{}s  level {}%", second, controller.current_level());
    }

    let outcome = match controller.stop().await {
        Some(outcome) => outcome,
        // The track ended on its own and the controller already stopped
        None => controller
            .last_outcome()
            .context("Test ended without an outcome")?,
    };

    if let Some(recording) = &outcome.recording {
        let artifact = controller
            .object_urls()
            .resolve(&recording.url)
            .context("Recording was released before it could be saved")?;

        tokio::fs::create_dir_all(&output)
            .await
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let path = output.join(&recording.filename);
        tokio::fs::write(&path, artifact.bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Recording saved: {} ({} bytes)", path.display(), artifact.size_bytes());
    } else {
        info!("No recording was captured");
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    controller.shutdown().await;
    Ok(())
}
