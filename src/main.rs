use clap::{Parser, Subcommand};
use embla_session::{ClientConfig, ConfigError, SessionController, TransportError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "embla-session", about = "Sign in to the identity service and inspect the session")]
struct Cli {
    /// Overrides `EMBLA_API_URL`.
    #[arg(long, env = "EMBLA_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore the session from the service and print it.
    Status,
    /// Sign in, print the profile and verify the cookie.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "EMBLA_PASSWORD", hide_env_values = true)]
        password: String,
        /// Sign out again before exiting.
        #[arg(long)]
        logout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = cli.api_url {
        config = ClientConfig::new(api_url)
            .with_timeouts(config.timeouts)
            .with_refresh_policy(config.refresh_policy);
    }

    let controller = SessionController::new(&config)?;
    tracing::info!(api_url = %config.api_url, policy = ?config.refresh_policy, "session client ready");

    match cli.command {
        Command::Status => run_status(&controller).await,
        Command::Login { email, password, logout } => run_login(&controller, &email, &password, logout).await,
    }
}

async fn run_status(controller: &SessionController) -> Result<(), CliError> {
    controller.bootstrap().await;
    let session = controller.session();
    let out = json!({ "phase": session.phase(), "user": session.user() });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_login(controller: &SessionController, email: &str, password: &str, logout: bool) -> Result<(), CliError> {
    let profile = controller.login(email, password).await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);

    let verified = controller.verify().await;
    println!("verified: {verified}");

    if logout {
        controller.logout().await;
        println!("phase: {}", serde_json::to_string(&controller.session().phase())?);
    }
    Ok(())
}
