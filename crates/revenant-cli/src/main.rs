//! revenant — transparent session proxy daemon.
//!
//! Accepts game clients on the configured listeners, opens the matching
//! upstream connection and hands both legs to the core broker. Everything
//! protocol-shaped lives in `revenant-core`; this binary is configuration,
//! logging and sockets.

mod config;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::{TcpListener, TcpStream};

use revenant_core::{broker, License, ProxyContext, Session};
use revenant_crypto::BbKeyFile;

use config::{Config, ListenerConfig};

/// Transparent man-in-the-middle proxy for the six protocol dialects
#[derive(Parser)]
#[command(name = "revenant")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "revenant.toml")]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy
    Run,
    /// Parse and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let log_level = if cli.debug {
        "trace".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    config.validate()?;

    match cli.command {
        Commands::CheckConfig => {
            println!("configuration ok: {} listener(s)", config.listeners.len());
            Ok(())
        }
        Commands::Run => run(config).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let ctx = Arc::new(build_context(&config)?);
    let session_ids = Arc::new(AtomicU64::new(1));

    let mut tasks = Vec::new();
    for listener in config.listeners.clone() {
        let ctx = Arc::clone(&ctx);
        let ids = Arc::clone(&session_ids);
        let licenses = config.licenses.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = serve(ctx, ids, listener, licenses).await {
                tracing::error!(%err, "listener failed");
            }
        }));
    }

    for task in tasks {
        task.await?;
    }
    Ok(())
}

fn build_context(config: &Config) -> anyhow::Result<ProxyContext> {
    let mut ctx = ProxyContext::new(config.name.clone(), config.capture_dir.clone());
    ctx.home_ports = config.home.clone().into();
    ctx.default_options = config.session.clone().into();

    for path in &config.bb_key_files {
        let raw = std::fs::read(path)
            .with_context(|| format!("reading bb key file {}", path.display()))?;
        let key = BbKeyFile::from_bytes(&raw)
            .with_context(|| format!("parsing bb key file {}", path.display()))?;
        ctx.bb_master_keys.push(Arc::new(key));
    }

    for license in &config.licenses {
        ctx.licenses.insert(License {
            serial_number: license.serial_number,
            access_key: license.access_key.clone(),
            gc_password: license.gc_password.clone(),
            bb_username: license.bb_username.clone(),
            bb_password: license.bb_password.clone(),
        });
    }

    Ok(ctx)
}

async fn serve(
    ctx: Arc<ProxyContext>,
    session_ids: Arc<AtomicU64>,
    listener_config: ListenerConfig,
    licenses: Vec<config::LicenseConfig>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listener_config.listen)
        .await
        .with_context(|| format!("binding {}", listener_config.listen))?;
    tracing::info!(
        listen = %listener_config.listen,
        dialect = %revenant_proto::Dialect::from(listener_config.dialect),
        destination = %listener_config.destination,
        "listener up"
    );

    loop {
        let (client, peer) = listener.accept().await?;
        let id = session_ids.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session = id, %peer, "client connected");

        let ctx = Arc::clone(&ctx);
        let listener_config = listener_config.clone();
        // Sessions on a configured listener are linked when the operator
        // stored a licence; the first one stands in for the local player
        let license = licenses
            .first()
            .and_then(|l| ctx.licenses.get(l.serial_number));

        tokio::spawn(async move {
            let result =
                session_task(ctx, id, listener_config, client, license).await;
            match result {
                Ok(()) => tracing::info!(session = id, "session ended"),
                Err(err) => tracing::error!(session = id, %err, "session dropped"),
            }
        });
    }
}

async fn session_task(
    ctx: Arc<ProxyContext>,
    id: u64,
    listener_config: ListenerConfig,
    client: TcpStream,
    license: Option<Arc<License>>,
) -> anyhow::Result<()> {
    let dialect = listener_config.dialect.into();
    let mut session = Session::new(
        id,
        dialect,
        listener_config.listen.port(),
        ctx.capture_dir.join(format!("session-{id}")),
    )?;
    session.options = ctx.default_options.clone();
    session.license = license;
    session.client_channel.attach(client.local_addr().ok(), false);

    let server = TcpStream::connect(listener_config.destination)
        .await
        .with_context(|| format!("connecting upstream {}", listener_config.destination))?;
    session.server_channel.attach(server.local_addr().ok(), false);
    session.next_destination = Some(listener_config.destination);

    broker::run_session(ctx, session, client, Some(server)).await?;
    Ok(())
}
