//! VibeMQ core inspector - look inside a broker's data directory
//!
//! Usage:
//!   vibemq-core [OPTIONS] <COMMAND>
//!
//! Commands:
//!   subscriptions          List stored subscriptions
//!   retained               List retained messages matching a filter
//!   pending <CLIENT>       List messages queued for an offline client
//!   match <TOPIC> [--qos]  Show the subscriptions a publish would reach
//!   qos2 <CLIENT> <ID>     Show an in-flight QoS 2 exchange
//!   clear-retained <TOPIC> Remove a retained message
//!   drop-pending <CLIENT>  Discard the queue of a client
//!   wipe <CLIENT>          Remove every subscription of a client
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -d, --data-dir <DIR>   Data directory (overrides persistence.path)
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help
//!
//! The broker must not be running against the same directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vibemq_core::config::{BackendType, Config};
use vibemq_core::persistence::{FjallBackend, MemoryBackend, PersistentStore, Qos2Key};
use vibemq_core::protocol::QoS;
use vibemq_core::topic::{
    is_wildcard_filter, validate_topic_filter, validate_topic_name, SubscriptionRegistry,
};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    #[default]
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// VibeMQ core inspector
#[derive(Parser, Debug)]
#[command(name = "vibemq-core")]
#[command(author = "VibeMQ Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and maintain the subscription and session store of a VibeMQ broker")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overrides persistence.path
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored subscriptions
    Subscriptions {
        /// Only show this client's subscriptions
        #[arg(long)]
        client: Option<String>,
    },
    /// List retained messages matching a filter
    Retained {
        /// Topic filter, wildcards allowed
        #[arg(long, default_value = "#")]
        filter: String,
    },
    /// List messages queued for an offline client
    Pending { client_id: String },
    /// Show the subscriptions a publish to TOPIC would reach
    Match {
        topic: String,
        /// QoS of the publish, caps the delivery QoS
        #[arg(long, default_value_t = 2)]
        qos: u8,
    },
    /// Show an in-flight QoS 2 exchange
    Qos2 { client_id: String, packet_id: u16 },
    /// Remove the retained message of a topic
    ClearRetained { topic: String },
    /// Discard every message queued for a client
    DropPending { client_id: String },
    /// Remove every subscription of a client
    Wipe { client_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise env overrides and defaults
    let loaded = match &args.config {
        Some(config_path) => Config::load(config_path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    let level = args
        .log_level
        .map(LogLevel::as_filter)
        .unwrap_or(config.log.level.as_str())
        .to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(config_path) = &args.config {
        info!("Loaded configuration from {:?}", config_path);
    }

    // CLI args override file config
    if let Some(data_dir) = args.data_dir {
        config.persistence.path = data_dir;
        config.persistence.backend = BackendType::Fjall;
    }

    let result = match config.persistence.backend {
        BackendType::Fjall => {
            let store: Arc<FjallBackend> = Arc::new(config.persistence.fjall_backend());
            run(store, &config, args.command).await
        }
        BackendType::Memory => {
            warn!("Memory backend selected, the store starts empty");
            run(Arc::new(MemoryBackend::new()), &config, args.command).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Open the store, execute one command and close the store again
async fn run<S>(
    store: Arc<S>,
    config: &Config,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: PersistentStore + 'static,
{
    store.init_store().await?;
    let result = execute(&store, config, command).await;
    // Close even if the command failed; the command's error wins
    let closed = store.close().await;
    result?;
    closed?;
    Ok(())
}

async fn execute<S>(
    store: &Arc<S>,
    config: &Config,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: PersistentStore + 'static,
{
    match command {
        Command::Subscriptions { client } => {
            let mut subs = store.list_all_subscriptions().await?;
            if let Some(client) = client {
                subs.retain(|s| *s.client_id == *client);
            }
            subs.sort_by(|a, b| (&a.client_id, &a.filter).cmp(&(&b.client_id, &b.filter)));
            for sub in &subs {
                println!(
                    "{}\t{}\tqos={}\tclean_session={}",
                    sub.client_id, sub.filter, sub.qos, sub.clean_session
                );
            }
            info!("{} subscriptions", subs.len());
        }
        Command::Retained { filter } => {
            validate_topic_filter(&filter)
                .map_err(|reason| format!("invalid filter '{}': {}", filter, reason))?;
            let mut messages = if is_wildcard_filter(&filter) {
                store.search_by_filter(&filter).await?
            } else {
                store.get_retained(&filter).await?.into_iter().collect()
            };
            messages.sort_by(|a, b| a.topic.cmp(&b.topic));
            for message in &messages {
                println!(
                    "{}\tqos={}\t{} bytes",
                    message.topic,
                    message.qos,
                    message.payload.len()
                );
            }
            info!("{} retained messages", messages.len());
        }
        Command::Pending { client_id } => {
            let events = store.list_messages_in_session(&client_id).await?;
            for event in &events {
                println!(
                    "{}\t{}\tqos={}\tretain={}\t{} bytes",
                    event.packet_id,
                    event.topic,
                    event.qos,
                    event.retain,
                    event.payload.len()
                );
            }
            info!("{} pending messages for {}", events.len(), client_id);
        }
        Command::Match { topic, qos } => {
            validate_topic_name(&topic)
                .map_err(|reason| format!("invalid topic '{}': {}", topic, reason))?;
            let publish_qos =
                QoS::from_u8(qos).ok_or_else(|| format!("invalid QoS {}, expected 0, 1 or 2", qos))?;
            let registry = SubscriptionRegistry::init_with_max_topic_levels(
                store.clone(),
                config.topics.max_topic_levels,
            )
            .await?;
            let mut matches: Vec<_> = registry.matches(&topic).into_iter().collect();
            matches.sort_by(|a, b| (&a.client_id, &a.filter).cmp(&(&b.client_id, &b.filter)));
            for sub in &matches {
                println!(
                    "{}\t{}\tqos={}\tdelivery_qos={}",
                    sub.client_id,
                    sub.filter,
                    sub.qos,
                    sub.qos.min(publish_qos)
                );
            }
        }
        Command::Qos2 {
            client_id,
            packet_id,
        } => {
            let key = Qos2Key::new(&client_id, packet_id);
            let event = store.retrieve_qos2_message(key.as_str()).await?;
            println!(
                "{}\t{}\tqos={}\tretain={}\t{} bytes",
                key,
                event.topic,
                event.qos,
                event.retain,
                event.payload.len()
            );
        }
        Command::ClearRetained { topic } => {
            store.clean_retained(&topic).await?;
            info!("Cleared retained message on {}", topic);
        }
        Command::DropPending { client_id } => {
            store.drop_messages_in_session(&client_id).await?;
            info!("Dropped pending messages of {}", client_id);
        }
        Command::Wipe { client_id } => {
            store.wipe_subscriptions(&client_id).await?;
            info!("Wiped subscriptions of {}", client_id);
        }
    }
    Ok(())
}
