//! `stride-dispatcher`: runs scheduled nudges and deferred deletions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use stride::channels::{OutboundThrottle, ResilientChannel, RetryPolicy, TelegramChannel};
use stride::scheduler::{Dispatcher, TemplateContent};
use stride::store::{Store, Subject};
use stride::StrideConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Goal-progress dispatcher: daily reminders, weekly check-ins and
/// deferred account deletion.
#[derive(Parser)]
#[command(name = "stride-dispatcher", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tick loop until Ctrl+C.
    Run,

    /// Run a single tick and print its report as JSON.
    Tick {
        /// Evaluate as of this RFC 3339 instant instead of now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Create the database and apply the schema.
    InitDb,

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Register or update a subject.
    UpsertSubject {
        id: String,
        #[arg(long, default_value = "")]
        name: String,
        /// IANA time zone, e.g. `Europe/Podgorica`.
        #[arg(long)]
        timezone: Option<String>,
        /// Telegram chat id or `@channel`.
        #[arg(long)]
        address: Option<String>,
        /// Opt the subject out of channel delivery.
        #[arg(long)]
        disabled: bool,
    },

    /// Schedule deletion of everything a subject owns.
    RequestDeletion {
        subject: String,
        /// Hours until execution; defaults to the configured grace period.
        #[arg(long)]
        in_hours: Option<u64>,
    },

    /// Cancel a subject's pending deletion.
    CancelDeletion { subject: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(StrideConfig::default_config_path);
    let config = load_config(&config_path, cli.config.is_some())?;
    let _log_guard = init_tracing(&config)?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Tick { at } => tick(config, at.unwrap_or_else(Utc::now)).await,
        Command::InitDb => {
            let store = Store::open(&config.store.db_path)?;
            println!(
                "{} (schema v{})",
                config.store.db_path.display(),
                store.schema_version()?.unwrap_or_default()
            );
            Ok(())
        }
        Command::InitConfig { force } => {
            if config_path.exists() && !force {
                anyhow::bail!("{} exists; pass --force to overwrite", config_path.display());
            }
            StrideConfig::default().save_to_file(&config_path)?;
            println!("{}", config_path.display());
            Ok(())
        }
        Command::UpsertSubject {
            id,
            name,
            timezone,
            address,
            disabled,
        } => {
            let store = Store::open(&config.store.db_path)?;
            let mut subject = Subject::new(id, name);
            subject.timezone = timezone;
            subject.channel_address = address;
            subject.channel_enabled = !disabled;
            store.upsert_subject(&subject)?;
            Ok(())
        }
        Command::RequestDeletion { subject, in_hours } => {
            let store = Store::open(&config.store.db_path)?;
            let delay = in_hours
                .map(|h| std::time::Duration::from_secs(h.saturating_mul(3600)))
                .unwrap_or_else(|| config.scheduler.deletion.grace_period());
            let eta = Utc::now().timestamp() + i64::try_from(delay.as_secs()).unwrap_or(i64::MAX / 2);
            let request = store.request_deletion(&subject, eta)?;
            println!("{}", serde_json::to_string_pretty(&request)?);
            Ok(())
        }
        Command::CancelDeletion { subject } => {
            let store = Store::open(&config.store.db_path)?;
            if store.cancel_deletion(&subject)? {
                println!("cancelled");
            } else {
                println!("nothing pending for {subject}");
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path, explicit: bool) -> anyhow::Result<StrideConfig> {
    let config = if path.exists() {
        StrideConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?
    } else if explicit {
        anyhow::bail!("config file {} not found", path.display());
    } else {
        StrideConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Console logging to stderr plus an optional daily-rolling file.
/// `RUST_LOG` overrides the configured filter.
fn init_tracing(
    config: &StrideConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("stride=info"));

    let (file_layer, guard) = match &config.logging.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "stride-dispatcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

fn build_dispatcher(config: &StrideConfig) -> anyhow::Result<Dispatcher> {
    let store = Arc::new(Store::open(&config.store.db_path)?);
    let telegram = TelegramChannel::from_config(&config.channel)?;
    let channel = ResilientChannel::new(Arc::new(telegram), RetryPolicy::from_config(&config.channel))
        .with_throttle(Arc::new(OutboundThrottle::new(
            config.channel.max_messages_per_minute,
        )));
    Ok(Dispatcher::new(
        store,
        channel,
        Arc::new(TemplateContent),
        &config.scheduler,
    ))
}

async fn run(config: StrideConfig) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            signal.cancel();
        }
    });

    info!(db = %config.store.db_path.display(), "stride-dispatcher starting");
    dispatcher
        .run(shutdown)
        .await
        .context("dispatcher task failed")?;
    info!("stride-dispatcher shut down cleanly");
    Ok(())
}

async fn tick(config: StrideConfig, at: DateTime<Utc>) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    let report = dispatcher.tick_at(at).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
