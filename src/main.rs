use clap::Parser;
use social_sso::commands::{Commands, handle_command};
use social_sso::{Config, Server};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "social-sso")]
#[command(about = "Social sign-in gateway for Google, Facebook and Sign in with Apple")]
struct Cli {
    #[arg(short, long, help = "Path to configuration file")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => Config::load_from_file(path),
        None => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.level))
        .init();

    if let Some(command) = cli.command {
        if let Err(e) = handle_command(command, &config).await {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    info!(
        base_url = %config.oauth.base_url,
        cache = %config.cache.backend,
        "Starting social sign-in gateway"
    );

    let server = match Server::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to initialize server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
