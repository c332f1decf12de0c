mod broadcast_commands;
mod config_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    herald_metrics::{MetricsHandle, MetricsRecorderConfig},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::broadcast_commands::SessionArgs;

#[derive(Parser)]
#[command(name = "herald", about = "herald: Discord broadcast control plane", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of discovery.
    #[arg(long, global = true, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,

    /// Print collected metrics in Prometheus text format when done.
    #[arg(long, global = true, default_value_t = false)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log the bot in and report its identity.
    Status {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Log the bot in and send a message to every reachable user. Sessions and
    /// cooldowns do not persist between invocations.
    Broadcast {
        #[command(flatten)]
        session: SessionArgs,
        /// Message text.
        #[arg(short, long)]
        message: String,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays machine-readable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn init_metrics(config: &herald_config::HeraldConfig) -> Option<MetricsHandle> {
    let recorder = MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: config
            .metrics
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };
    match herald_metrics::init_metrics(recorder) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder");
            None
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "herald starting");

    let config_path = cli.config.as_deref();
    let (result, metrics) = match cli.command {
        Commands::Config { action } => {
            return config_commands::handle_config(action, config_path);
        },
        Commands::Status { session } => {
            let config = herald_config::load_or_discover(config_path)?;
            let metrics = init_metrics(&config);
            (broadcast_commands::status(&config, &session).await, metrics)
        },
        Commands::Broadcast { session, message } => {
            let config = herald_config::load_or_discover(config_path)?;
            let metrics = init_metrics(&config);
            let result = broadcast_commands::broadcast(&config, &session, &message).await;
            (result, metrics)
        },
    };

    if cli.print_metrics
        && let Some(handle) = metrics
    {
        eprint!("{}", handle.render());
    }

    if let Err(e) = result {
        println!("{}", broadcast_commands::error_body(&e));
        eprintln!("error: {}: {e}", e.kind());
        std::process::exit(1);
    }
    Ok(())
}
