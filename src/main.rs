//! oxidized-session
//!
//! Headless session runner. Boots a program image with the null graphics
//! context and runs it until the guest shuts down, an error is reported, or
//! the optional quantum budget is used up.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use oc_core::{logging, Config, CoreError, GraphicsApi, ResultStatus};
use oc_integration::{create_error_bridge, Frontend, SessionController};
use oc_loader::ImageLoader;
use oc_rsx::{HeadlessFactory, LoadCallbackStage};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "oxidized-session", version, about = "Run a program image headlessly")]
struct Args {
    /// Program image to boot
    path: PathBuf,

    /// Settings file (default: the user configuration directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop the session after this many quanta
    #[arg(long)]
    quanta: Option<u64>,
}

/// Logs everything and never asks to recover
struct LogFrontend;

impl Frontend for LogFrontend {
    fn on_error(&mut self, kind: CoreError, details: &str) -> bool {
        tracing::error!("{}: {}", kind, details);
        false
    }

    fn on_progress(&mut self, stage: LoadCallbackStage, progress: usize, max: usize) {
        tracing::debug!("Loading disk resources: {:?} {}/{}", stage, progress, max);
    }

    fn on_exit(&mut self, status: ResultStatus) {
        tracing::warn!("Session ended: {}", status);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?,
        None => Config::load().context("Failed to load settings")?,
    };
    logging::init(&config.debug);
    logging::log_host_info();

    if config.graphics.api != GraphicsApi::Null {
        tracing::info!("Headless run, using the null graphics context");
        config.graphics.api = GraphicsApi::Null;
    }

    let factory = if config.graphics.use_disk_shader_cache {
        HeadlessFactory::with_shader_cache(config.paths.shader_cache.clone())
    } else {
        HeadlessFactory::new()
    };
    let (bridge, link) = create_error_bridge();
    let controller = SessionController::new(
        config.into_shared(),
        Arc::new(ImageLoader::new()),
        Arc::new(factory),
        bridge,
    )?;

    let runner = controller.clone();
    let path = args.path.clone();
    let execution = thread::Builder::new()
        .name("emu".to_string())
        .spawn(move || runner.run(&path))
        .context("Failed to spawn the execution thread")?;

    let mut frontend = LogFrontend;
    link.serve_until(&mut frontend, || {
        if let Some(limit) = args.quanta {
            if controller.is_running() && controller.quanta_run() >= limit {
                tracing::info!("Quantum budget of {} reached", limit);
                controller.stop();
            }
        }
        execution.is_finished()
    });

    let status = execution
        .join()
        .map_err(|_| anyhow!("Execution thread panicked"))?;
    tracing::info!("Finished with {}", status);

    match status {
        ResultStatus::Success | ResultStatus::ShutdownRequested => Ok(()),
        status => bail!("Session ended with {}", status),
    }
}
