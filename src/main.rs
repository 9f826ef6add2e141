use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use messenger_core::{
    config::Config,
    crypto::TokenKeys,
    error::AppError,
    token::{AuthorizationClaims, TokenAuthority},
    AppState,
};

#[derive(Parser, Debug)]
#[command(name = "messenger")]
#[command(author, version, about = "Messenger service operator tool", long_about = None)]
struct Args {
    /// Override the keys directory (defaults to MESSENGER_KEYS_DIR)
    #[arg(long)]
    keys_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the token keypair, or load it if present
    Keygen,
    /// Print an authorization token for an account id
    Issue { user_id: Uuid },
    /// Check a token and print its claims
    Verify { token: String },
    /// Seed an in-process service and list what it contains
    Seed {
        /// Also create an admin account with this username
        #[arg(long, requires = "password")]
        admin: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(dir) = args.keys_dir {
        config.keys_dir = dir;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Messenger v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Keygen => {
            let keys = TokenKeys::setup(&config.keys_dir)?;
            println!("{}", keys.public_key_base64());
        }
        Command::Issue { user_id } => {
            let tokens = TokenAuthority::from_config(&config)?;
            println!("{}", tokens.issue_authorization(user_id)?);
        }
        Command::Verify { token } => {
            let tokens = TokenAuthority::from_config(&config)?;
            let token = token.trim();

            if !tokens.verify(token) {
                println!("invalid");
                return Ok(());
            }

            match tokens.open::<AuthorizationClaims>(token) {
                Ok(claims) => println!("valid\n{}", serde_json::to_string_pretty(&claims)?),
                Err(e) => println!("signature ok, not a usable authorization token: {}", e),
            }
        }
        Command::Seed { admin, password } => seed(config, admin, password).await?,
    }

    Ok(())
}

async fn seed(config: Config, admin: Option<String>, password: Option<String>) -> Result<(), AppError> {
    let state = AppState::bootstrap(config).await?;

    let admin_id = match (admin, password) {
        (Some(username), Some(password)) => {
            let id = state.service.bootstrap_admin(&username, &password).await?;
            tracing::info!("Admin {} created", username);
            Some(id)
        }
        _ => None,
    };

    for account in state.service.get_all_accounts().await? {
        tracing::info!(
            "Account {} {} (admin: {}, locked: {})",
            account.id,
            account.username,
            account.is_admin,
            account.locked
        );
    }

    if let Some(admin_id) = admin_id {
        for channel in state.service.get_all_channels(admin_id).await? {
            tracing::info!("Channel {} {} members {:?}", channel.id, channel.name, channel.member_names);
        }
        println!("{}", state.tokens.issue_authorization(admin_id)?);
    }

    Ok(())
}
