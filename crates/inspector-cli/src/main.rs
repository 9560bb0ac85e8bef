use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use inspector_core::cdp::FrontendChannel;
use inspector_core::config::BridgeConfig;
use inspector_core::executor::{job_queue, spawn_script_domain};
use inspector_core::script::InMemoryScriptRuntime;
use inspector_core::{InspectorSession, RuntimeTarget, VoidExecutor};

mod host;

use host::{Host, StdioTargetDelegate};

#[derive(Parser)]
#[command(name = "inspector")]
#[command(about = "Drive a runtime target and one inspector session over stdio.")]
struct Args {
    /// Path to a TOML bridge config
    #[arg(short, long, env = "INSPECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Binding to install at startup (repeatable)
    #[arg(short, long = "binding")]
    bindings: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_tracing(args.debug);

    let config = load_config(&args).await?;
    run(config).await
}

fn init_tracing(debug: bool) {
    let log_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("inspector={log_level},inspector_core={log_level}"))
    });

    // stdout carries protocol messages.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(args: &Args) -> inspector_core::Result<BridgeConfig> {
    let config = match &args.config {
        Some(path) => BridgeConfig::load(path).await?,
        None => BridgeConfig::default(),
    };
    Ok(config.with_bindings(args.bindings.iter().cloned())?)
}

async fn run(config: BridgeConfig) -> Result<()> {
    let script = spawn_script_domain(InMemoryScriptRuntime::new());
    let (control_sender, mut control_queue) = job_queue::<()>();

    let target = RuntimeTarget::create(
        config.context.clone(),
        Arc::new(StdioTargetDelegate),
        script.runtime_executor(),
        VoidExecutor::from(control_sender),
    );
    for binding in &config.bindings {
        target.controller().install_binding_handler(binding);
    }
    info!(
        execution_context_id = config.context.id,
        bindings = config.bindings.len(),
        "Runtime target ready"
    );

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_frontend_messages(out_rx));

    let mut session = InspectorSession::new(FrontendChannel::from(out_tx));
    session.attach_runtime(&target);
    let mut host = Host::new(target, session, script.runtime_executor());

    let input = host
        .pump(BufReader::new(tokio::io::stdin()), &mut control_queue)
        .await;
    match &input {
        Ok(()) => debug!("End of input, shutting down"),
        Err(error) => warn!(%error, "Reading input failed, shutting down"),
    }

    host.shutdown(&script, &mut control_queue).await?;
    drop(host);
    writer.await??;
    input?;
    Ok(())
}

async fn write_frontend_messages(mut rx: mpsc::UnboundedReceiver<String>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = rx.recv().await {
        stdout.write_all(message.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
