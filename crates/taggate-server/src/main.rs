mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use taggate_api::auth::{AppState, AppStateInner};
use taggate_api::clients::{self, HCaptchaClient, InstagramClient, PaymentGatewayClient};
use taggate_core::{Collaborators, SystemClock, TagService};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taggate=debug,tower_http=debug".into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    if config.core.enable_captcha && config.hcaptcha_secret.is_empty() {
        warn!("Captcha is enabled but TAGGATE_HCAPTCHA_SECRET is unset; challenges will fail");
    }
    if config.core.enable_card_payment && config.payment_gateway_url.is_empty() {
        warn!("Card payments are enabled but TAGGATE_PAYMENT_GATEWAY_URL is unset");
    }

    // Init database
    let db = Arc::new(taggate_db::Database::open(&config.db_path)?);

    // Remote collaborators share one pooled client
    let http = clients::http_client(config.core.collaborator_timeout)?;
    let service = TagService::new(
        config.core.clone(),
        Collaborators {
            store: db.clone(),
            captcha: Arc::new(HCaptchaClient::new(http.clone(), config.hcaptcha_secret.clone())),
            payments: Arc::new(PaymentGatewayClient::new(
                http.clone(),
                config.payment_gateway_url.clone(),
            )),
            profiles: Arc::new(InstagramClient::new(http)),
            clock: Arc::new(SystemClock),
        },
    );

    let state: AppState = Arc::new(AppStateInner {
        db,
        service: Arc::new(service),
        jwt_secret: config.jwt_secret.clone(),
        max_requests_per_hour: config.max_requests_per_hour,
    });

    let app = taggate_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Taggate listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Taggate shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
