use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use balancelive::api::HttpDocumentApi;
use balancelive::commands;
use balancelive::models::{ListQuery, SortOrder};
use balancelive::services::channel::PushChannel;
use balancelive::services::transport::WsConnector;
use balancelive::{spawn_synchronizer, Settings};

/// Live status of balance-sheet documents
#[derive(Parser, Debug)]
#[command(name = "balancelive")]
#[command(version)]
struct Args {
    /// TOML settings file
    #[arg(short, long, env = "BALANCELIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://localhost:8000
    #[arg(long, env = "BALANCELIVE_BASE_URL")]
    base_url: Option<String>,

    /// Session cookie sent with every request and the push channel handshake
    #[arg(long, env = "BALANCELIVE_SESSION", hide_env_values = true)]
    session_cookie: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow one document
    Watch {
        id: String,
    },
    /// Follow one page of the document list
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        search: Option<String>,
        /// Status tag, e.g. "Analizado"
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "upload_date")]
        sort_by: String,
        #[arg(long)]
        desc: bool,
    },
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "balancelive=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(cookie) = args.session_cookie {
        settings.session_cookie = Some(cookie);
    }
    settings.validate().context("Invalid settings")?;

    let session = settings.session();
    info!(base_url = %settings.base_url, client_id = %session.client_id, "starting");

    let api = HttpDocumentApi::new(&settings.base_url, session.clone());
    let channel = PushChannel::open(WsConnector, settings.endpoint(session), settings.reconnect_policy())
        .context("Failed to open push channel")?;
    let handle = spawn_synchronizer(api, channel, settings.progress_policy);

    let mut stdout = std::io::stdout();
    match args.command {
        Command::Watch { id } => commands::watch::watch(&handle, &id, &mut stdout, shutdown_signal()).await?,
        Command::List {
            page,
            search,
            status,
            sort_by,
            desc,
        } => {
            let query = ListQuery {
                page,
                page_size: settings.page_size,
                search,
                status,
                sort_by: Some(sort_by),
                sort_order: if desc { SortOrder::Desc } else { SortOrder::Asc },
            };
            commands::list::list(&handle, query, &mut stdout, shutdown_signal()).await?
        }
    }

    info!("stopped");
    Ok(())
}
