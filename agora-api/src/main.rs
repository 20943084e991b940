use agora_common::{
    snowflake::{ProcessId, WorkerId},
    util::PositiveDuration,
};
use agora_core::{
    notify::{DEFAULT_MAX_ATTEMPTS, RetryPolicy},
    social::{Social, SocialConfig},
};
use agora_db::{DbClient, DbError};
use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE, InvalidHeaderValue},
};
use serde::Deserialize;
use server::{ServerState, SessionConfig};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up database: {0}")]
    Database(#[from] DbError),
    #[error("Client URL is not a valid origin: {0}")]
    ClientUrl(#[from] InvalidHeaderValue),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

const fn default_session_lifetime_hours() -> i64 {
    720
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_max_connections() -> u32 {
    10
}

fn default_cookie_name() -> String {
    "auth_token".to_owned()
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    #[serde(default = "default_max_connections")]
    database_max_connections: u32,
    worker_id: WorkerId,
    process_id: ProcessId,
    /// Zero issues sessions that never expire.
    #[serde(default = "default_session_lifetime_hours")]
    session_lifetime_hours: i64,
    #[serde(default = "default_cookie_name")]
    session_cookie_name: String,
    #[serde(default = "default_max_attempts")]
    notification_max_attempts: u32,
    /// Origin allowed to make credentialed cross-origin requests.
    client_url: Option<String>,
}

impl Env {
    fn session_lifetime(&self) -> Option<PositiveDuration> {
        PositiveDuration::new(Duration::hours(self.session_lifetime_hours))
    }
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora_api=debug,agora_core=debug,agora_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn cors_layer(client_url: &str) -> Result<CorsLayer, InitError> {
    let origin: HeaderValue = client_url.parse()?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

/// Resolves once Ctrl-C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                error!(%error, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let pool = agora_db::connect(&env.database_url, env.database_max_connections).await?;
    agora_db::migrate(&pool).await?;
    let store = Arc::new(DbClient::new(pool.clone(), env.worker_id, env.process_id));

    let config = SocialConfig {
        retry: RetryPolicy {
            max_attempts: env.notification_max_attempts,
        },
        session_lifetime: env.session_lifetime(),
        ..SocialConfig::default()
    };
    let state = ServerState {
        social: Arc::new(Social::new(store, config)),
        session: Arc::new(SessionConfig {
            cookie_name: env.session_cookie_name.clone(),
            lifetime: env.session_lifetime(),
        }),
    };

    let app = server::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    let app = match &env.client_url {
        Some(client_url) => app.layer(cors_layer(client_url)?),
        None => app,
    };

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    pool.close().await;
    Ok(())
}
