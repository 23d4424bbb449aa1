use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod dates;
mod dietologists;
mod error;
mod meals;
mod nutrition;
mod response;
mod state;
mod storage;
mod users;

use crate::{
    auth::password::hash_password,
    dietologists::repo::Dietologist,
    state::AppState,
};

#[derive(Parser)]
#[command(name = "nutritrack", about = "Nutrition tracking API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Create a dietologist account for the portal
    CreateDietologist {
        #[arg(long)]
        phone: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "nutritrack=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let app_state = AppState::init().await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app::serve(app::build_app(app_state)).await,
        Command::CreateDietologist {
            phone,
            first_name,
            last_name,
            password,
        } => {
            if !auth::dto::is_valid_phone(&phone) {
                anyhow::bail!("invalid phone number: {phone}");
            }
            let hash = hash_password(&password)?;
            let d = Dietologist::create(&app_state.db, &phone, &first_name, &last_name, &hash).await?;
            tracing::info!(dietologist_id = %d.id, phone = %d.phone_number, "dietologist created");
            Ok(())
        }
    }
}
