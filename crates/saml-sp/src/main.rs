use axum::Extension;
use axum::Router;
use axum::routing::get;
use saml_sp::{SamlConfig, SamlIdentity, SamlState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn whoami(identity: Option<Extension<SamlIdentity>>) -> String {
    match identity {
        Some(Extension(identity)) => format!(
            "authenticated as {} ({})",
            identity.principal_id,
            identity.attribute("email").unwrap_or("no email"),
        ),
        None => "anonymous".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = SamlConfig::from_env()?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let addr = format!("{host}:{port}");

    let state = Arc::new(SamlState::new(config));
    tokio::spawn(saml_sp::session::session_cleanup_task(state.sessions.clone()));

    let app = Router::new().route("/", get(whoami)).fallback(whoami);
    let app = saml_sp::attach(app, state).layer(TraceLayer::new_for_http());

    tracing::info!("listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
