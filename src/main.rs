use anyhow::Result;
use clap::{Parser, Subcommand};
use gatehouse::auth::ClaimsGate;
use gatehouse::config::Config;
use gatehouse::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "gatehouse",
    version,
    about = "Admission, caching and auth gate for the magazine API"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print a signed token for the configured issuer and audience
    IssueToken {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 60, allow_negative_numbers = true)]
        ttl_minutes: i64,
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gatehouse={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(
                bind_addr = %config.bind_addr,
                redis_configured = config.redis_url().is_some(),
                rate_limit_rpm = config.rate_limit_rpm,
                "Starting gatehouse"
            );

            let server = Server::new(config)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

            server
                .run()
                .await
                .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
        }
        Command::IssueToken {
            subject,
            ttl_minutes,
            admin,
        } => {
            let gate = ClaimsGate::from_config(&config)?;
            println!("{}", gate.issue(&subject, ttl_minutes, admin)?);
        }
    }

    Ok(())
}
