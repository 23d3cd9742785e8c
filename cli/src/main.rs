//! deckhand - Entry Point
//!
//! Operator CLI for Postgres recipes, log streaming and deployment monitoring.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use platform_api::MachineState;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use deckhand::app::commands::{self, ProvisionArgs};
use deckhand::app::context::CliContext;
use deckhand::app::options::CliOptions;
use deckhand::logs::{init_logging, LogLevel};
use deckhand::storage::layout::StorageLayout;
use deckhand::storage::settings::Settings;
use deckhand::utils::version_info;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Fleet recipes, log streaming and deployment monitoring", long_about = None)]
struct Cli {
    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Override the control-plane URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream an app's logs
    Logs {
        app: String,

        /// Filter by region
        #[arg(short, long)]
        region: Option<String>,

        /// Filter by instance ID
        #[arg(short, long)]
        instance: Option<String>,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Watch deployments of an app
    Monitor {
        app: String,

        /// Print each changed allocation
        #[arg(short, long)]
        verbose: bool,
    },

    /// Machine operations
    #[command(subcommand)]
    Machines(MachinesCommand),

    /// Postgres cluster recipes
    #[command(subcommand)]
    Recipes(RecipesCommand),

    /// Write the effective settings to the settings file
    InitConfig,

    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum MachinesCommand {
    /// List an app's machines
    List {
        app: String,

        /// Only machines in this state
        #[arg(long)]
        state: Option<MachineState>,
    },
}

#[derive(Subcommand)]
enum RecipesCommand {
    /// Restart replicas, fail over, restart the former leader
    PostgresReboot { app: String },

    /// Replace every member with a new image, leader last
    PostgresUpgrade {
        app: String,

        /// Target image reference
        #[arg(long)]
        image: String,
    },

    /// Run SQL on the current leader
    PostgresSql { app: String, sql: String },

    /// Create a new Postgres cluster
    PostgresProvision(ProvisionCliArgs),
}

#[derive(Args)]
struct ProvisionCliArgs {
    app: String,

    /// Organization slug; defaults to api.default_org
    #[arg(long)]
    org: Option<String>,

    #[arg(long)]
    region: String,

    /// Number of machines
    #[arg(long, default_value_t = 2)]
    count: u32,

    /// Image reference; defaults to flyio/postgres:14
    #[arg(long)]
    image: Option<String>,

    /// Volume size in GB
    #[arg(long, default_value_t = 10)]
    volume_size: u32,

    /// Operator password; generated when omitted
    #[arg(long)]
    password: Option<String>,

    #[arg(long, conflicts_with = "etcd_url")]
    consul_url: Option<String>,

    #[arg(long)]
    etcd_url: Option<String>,
}

impl From<ProvisionCliArgs> for ProvisionArgs {
    fn from(args: ProvisionCliArgs) -> Self {
        Self {
            app_name: args.app,
            org: args.org,
            region: args.region,
            count: args.count,
            image: args.image,
            volume_size_gb: args.volume_size,
            password: args.password,
            consul_url: args.consul_url,
            etcd_url: args.etcd_url,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(());
    }

    let layout = StorageLayout::default();
    let mut settings = Settings::load(&layout)
        .await
        .context("Unable to read settings file")?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    if let Some(url) = cli.api_url {
        settings.api.base_url = url;
    }

    if settings.log_to_file {
        layout.setup().await?;
    }
    let options = CliOptions::from_settings(&settings, Some(&layout));
    let _guard = match init_logging(options.logging.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            await_shutdown_signal().await;
            cancel.cancel();
        });
    }

    let ctx = CliContext::new(settings, options, cancel)?;

    match cli.command {
        Commands::Logs {
            app,
            region,
            instance,
            json,
        } => commands::logs(&ctx, &app, region, instance, json).await?,
        Commands::Monitor { app, verbose } => commands::monitor(&ctx, &app, verbose).await?,
        Commands::Machines(MachinesCommand::List { app, state }) => {
            commands::list_machines(&ctx, &app, state).await?
        }
        Commands::Recipes(recipe) => match recipe {
            RecipesCommand::PostgresReboot { app } => commands::postgres_reboot(&ctx, &app).await?,
            RecipesCommand::PostgresUpgrade { app, image } => {
                commands::postgres_upgrade(&ctx, &app, &image).await?
            }
            RecipesCommand::PostgresSql { app, sql } => {
                commands::postgres_sql(&ctx, &app, &sql).await?
            }
            RecipesCommand::PostgresProvision(args) => {
                commands::postgres_provision(&ctx, args.into()).await?
            }
        },
        Commands::InitConfig => {
            layout.setup().await?;
            ctx.settings.save(&layout).await?;
            println!("Wrote {}", layout.settings_file().path().display());
        }
        Commands::Version => {}
    }

    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}
