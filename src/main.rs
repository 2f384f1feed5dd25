use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lemonchat_gateway::billing::display::format_price;
use lemonchat_gateway::config::file::config_file_path;
use lemonchat_gateway::{ApiServerBuilder, BillingService, Config, LemonSqueezyClient, db};

/// Lemonchat - chat relay and subscription billing gateway
#[derive(Parser)]
#[command(name = "lemonchat", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Pull subscription plans from the Lemon Squeezy store
    SyncPlans,
    /// Print the config file location
    ConfigPath,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lemonchat_gateway=info",
        1 => "info,lemonchat_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.port).await,
        Command::SyncPlans => sync_plans().await,
        Command::ConfigPath => {
            match config_file_path() {
                Some(path) => println!("{}", path.display()),
                None => anyhow::bail!("no home directory to place the config file in"),
            }
            Ok(())
        }
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(
        port = config.server.port,
        db = %config.db_path.display(),
        assistant = %config.assistant.api_url,
        "starting lemonchat gateway"
    );

    let pool = db::init(&config.db_path)?;
    let server = ApiServerBuilder::from_config(&config, pool).build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

async fn sync_plans() -> anyhow::Result<()> {
    let config = Config::load()?;
    let pool = db::init(&config.db_path)?;

    let billing = BillingService::new(
        Arc::new(LemonSqueezyClient::new(&config.lemonsqueezy)),
        pool,
        config.server.app_url.clone(),
        config.server.subscriber_cache_secs,
    );

    let plans = billing.sync_plans().await?;
    for plan in &plans {
        println!(
            "{:>10}  {:<30} {}",
            plan.variant_id,
            plan.name,
            format_price(&plan.price)
        );
    }
    tracing::info!(count = plans.len(), "plans synced");
    Ok(())
}
