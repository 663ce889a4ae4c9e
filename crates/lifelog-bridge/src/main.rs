//! Life-Log bridge - durable record queue and HTTP uploader.
//!
//! Run with: `cargo run -p lifelog-bridge`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use time::format_description::well_known::Rfc3339;
use tracing::info;

use lifelog_bridge::config::default_config_path;
use lifelog_bridge::settings::ConfigStore;
use lifelog_bridge::state::device_channel;
use lifelog_bridge::{AppState, Config, HttpTransport, Session};
use lifelog_store::{PersistentQueue, Store};

/// Life-Log bridge - relays device records to an HTTP endpoint.
#[derive(Parser, Debug)]
#[command(name = "lifelog-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge in the foreground (default behavior).
    Run,

    /// Print the pending queue and upload configuration.
    Status,

    /// Print the configuration UI URL with the current settings.
    ConfigUrl,

    /// Write a default configuration file.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.command {
        Some(Command::Init { force }) => init_config(&args, *force),
        Some(Command::Status) => print_status(&load_config(&args)?),
        Some(Command::ConfigUrl) => print_config_url(&load_config(&args)?),
        Some(Command::Run) | None => run_server(load_config(&args)?).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

fn init_config(args: &Args, force: bool) -> anyhow::Result<()> {
    let path = args.config.clone().unwrap_or_else(default_config_path);
    Config::init(&path, force)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn print_status(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;
    let queue = PersistentQueue::load(&store)?;
    let settings = ConfigStore::load(&store)?;
    let configuration = settings.configuration();

    println!("Database:      {}", config.storage.path.display());
    println!("Pending:       {}", queue.len());
    if let Some(head) = queue.peek_head() {
        println!("Head:          {}", head.key);
    }
    println!(
        "Last sent:     {}",
        PersistentQueue::last_sent_key(&store)?.unwrap_or_else(|| "-".to_string())
    );
    if let Some(at) = PersistentQueue::last_sent_at(&store)? {
        println!("Last sent at:  {}", at.format(&Rfc3339)?);
    }
    println!(
        "Endpoint:      {}",
        configuration.endpoint.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "Data field:    {}",
        configuration.data_field.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "Signing:       {}",
        configuration
            .signing
            .as_ref()
            .map(|s| format!("{} in '{}'", s.algorithm, s.field_name))
            .unwrap_or_else(|| "off".to_string())
    );
    Ok(())
}

fn print_config_url(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;
    let settings = ConfigStore::load(&store)?;
    println!("{}", settings.configuration_url(&config.config_ui.base_url));
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.logging.level.parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let transport = HttpTransport::new(config.upload.timeout(), &config.upload.user_agent)?;
    let device_tx = device_channel(&config);
    let session = Session::load(
        store,
        Arc::new(transport),
        device_tx.clone(),
        config.config_ui.base_url.clone(),
    )?;

    let state = AppState::new(session.handle(), device_tx, &config);
    let session_task = tokio::spawn(session.run());

    let app = lifelog_bridge::app(state);
    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    session_task.abort();
    Ok(())
}
