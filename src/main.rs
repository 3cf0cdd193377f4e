use std::process::ExitCode;
use std::sync::Arc;

use maildrop::database::{self, DatabaseError, SqliteStore};
use maildrop::tracing::setup_tracing;
use maildrop::{Config, ConfigError, SmtpError, SmtpServer, TcpSpamOracle};
use thiserror::Error;
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Error)]
enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Smtp(#[from] SmtpError),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    if let Err(e) = setup_tracing() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;

    let pool =
        database::connect(&config.database_url, config.database_max_connections)
            .await?;
    database::migrate(&pool).await?;
    info!("Using database {}", config.database_url);

    let store = Arc::new(SqliteStore::new(pool));
    let oracle = Arc::new(TcpSpamOracle::new(
        config.spam_oracle_addr,
        config.spam_oracle_timeout,
    ));

    let server = SmtpServer::new(config, oracle, store);
    let handle = server.handle();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                handle.shutdown().await;
            }
            Err(e) => error!("Couldn't listen for Ctrl-C: {}", e),
        }
    });

    server.start().await?;
    Ok(())
}
