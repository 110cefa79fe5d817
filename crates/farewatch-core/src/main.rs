//! Farewatch CLI
//!
//! Command-line interface for the Farewatch flight-price tracker.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use farewatch::alerts::{
    AlertRepository, Notify, PriceChecker, PriceHistoryRepository, TelegramNotifier,
};
use farewatch::api::{AppState, HttpServer};
use farewatch::bot::TelegramBot;
use farewatch::db::{Database, PriceCache};
use farewatch::flights::TequilaClient;
use farewatch::Config;

/// Farewatch - flight price tracking and alerting
#[derive(Parser)]
#[command(name = "farewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "FAREWATCH_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations, then the API server, price checker and bot
    Serve {
        /// HTTP API port (overrides configuration)
        #[arg(long, env = "FAREWATCH_PORT")]
        port: Option<u16>,

        /// Bind host (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Do not start the Telegram bot
        #[arg(long)]
        no_bot: bool,

        /// Do not start the price checker
        #[arg(long)]
        no_checker: bool,
    },

    /// Run one price sweep and print the outcomes as JSON lines
    Check {
        /// Check a single alert instead of every due alert
        #[arg(long)]
        alert_id: Option<i64>,
    },

    /// Run the Telegram bot loop only
    Bot,

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Probe database and Redis health
    Health,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config, cli.verbose);

    let result = match cli.command {
        Commands::Serve {
            port,
            host,
            no_bot,
            no_checker,
        } => run_serve(config, port, host, no_bot, no_checker).await,
        Commands::Check { alert_id } => run_check(config, alert_id).await,
        Commands::Bot => run_bot(config).await,
        Commands::Db { command } => run_db(config, command).await,
        Commands::Health => run_health(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Service components built on top of one database bundle
struct Services {
    db: Database,
    alerts: AlertRepository,
    history: PriceHistoryRepository,
    flights: TequilaClient,
    cache: PriceCache,
    notifier: Arc<dyn Notify>,
}

impl Services {
    fn build(config: &Config, db: Database) -> anyhow::Result<Self> {
        let alerts = AlertRepository::new(&db.postgres);
        let history = PriceHistoryRepository::new(&db.postgres);
        let flights = TequilaClient::new(&config.tequila)?;
        let cache = PriceCache::new(&db.redis, config.redis.route_cache_ttl);
        let notifier: Arc<dyn Notify> = Arc::new(TelegramNotifier::new(&config.telegram)?);

        Ok(Self {
            db,
            alerts,
            history,
            flights,
            cache,
            notifier,
        })
    }

    fn checker(&self, config: &Config) -> PriceChecker {
        PriceChecker::new(
            self.alerts.clone(),
            self.history.clone(),
            self.flights.clone(),
            self.notifier.clone(),
            self.cache.clone(),
            config.checker.clone(),
        )
    }
}

async fn run_serve(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    no_bot: bool,
    no_checker: bool,
) -> anyhow::Result<()> {
    let db = Database::new(&config).await?;
    db.migrate().await?;

    let services = Services::build(&config, db)?;

    if no_checker {
        info!("Price checker disabled");
    } else {
        let checker = services.checker(&config);
        tokio::spawn(async move { checker.start().await });
    }

    if no_bot {
        info!("Telegram bot disabled");
    } else {
        let bot = TelegramBot::new(&config.telegram, services.alerts.clone())?;
        tokio::spawn(async move { bot.run().await });
    }

    let state = AppState {
        db: services.db.clone(),
        alerts: services.alerts.clone(),
        history: services.history.clone(),
        flights: services.flights.clone(),
        cache: services.cache.clone(),
        notifier: services.notifier.clone(),
    };

    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );
    let server = HttpServer::new(state, config.server.cors_origins.clone());

    tokio::select! {
        result = server.serve(&addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn run_check(config: Config, alert_id: Option<i64>) -> anyhow::Result<()> {
    let db = Database::new(&config).await?;
    let services = Services::build(&config, db)?;
    let checker = services.checker(&config);

    let outcomes = match alert_id {
        Some(id) => vec![checker.check_one(id).await?],
        None => checker.sweep().await?,
    };

    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }
    info!(checked = outcomes.len(), "Check finished");

    Ok(())
}

async fn run_bot(config: Config) -> anyhow::Result<()> {
    if !config.telegram.is_configured() {
        anyhow::bail!("telegram.bot_token is not configured");
    }

    let db = Database::new(&config).await?;
    let alerts = AlertRepository::new(&db.postgres);
    let bot = TelegramBot::new(&config.telegram, alerts)?;

    tokio::select! {
        () = bot.run() => {},
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn run_db(config: Config, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let db = Database::new(&config).await?;
            db.migrate().await?;
            info!("Migrations applied");
        }
    }
    Ok(())
}

async fn run_health(config: Config) -> anyhow::Result<()> {
    let db = Database::lazy(&config)?;

    let postgres = db.postgres.health_check().await;
    let redis = db.redis.health_check().await;

    println!("database: {}", status_line(&postgres));
    println!("redis:    {}", status_line(&redis));

    if postgres.is_err() || redis.is_err() {
        anyhow::bail!("one or more dependencies are unhealthy");
    }
    Ok(())
}

fn status_line(result: &farewatch::Result<()>) -> String {
    match result {
        Ok(()) => "healthy".to_string(),
        Err(e) => format!("unhealthy: {e}"),
    }
}
