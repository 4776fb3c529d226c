use anyhow::Context;
use session_client::{
    config::Config,
    logging,
    realtime::TungsteniteConnector,
    HttpTransport, NotificationService, ReqwestTransport, RequestPipeline, Session, SessionError,
    TokenStore,
};
use std::sync::Arc;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cfg = Config::from_env()?;
    let email = std::env::var("SESSION_EMAIL").context("SESSION_EMAIL must be set")?;
    let password = std::env::var("SESSION_PASSWORD").context("SESSION_PASSWORD must be set")?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&cfg.api)?);
    let tokens = TokenStore::new();

    let session_ended = Arc::new(Notify::new());
    let on_session_ended = {
        let session_ended = session_ended.clone();
        move |reason: &SessionError| {
            tracing::warn!(error = %reason, "session ended, returning to login");
            session_ended.notify_one();
        }
    };

    let session = Session::new(transport.clone(), tokens.clone());
    session
        .login(&email, &password)
        .await
        .context("login failed")?;

    let pipeline = Arc::new(RequestPipeline::new(
        transport,
        tokens,
        Arc::new(on_session_ended),
    ));
    let service = NotificationService::new(&cfg, pipeline, Arc::new(TungsteniteConnector));

    if let Err(e) = service.start().await {
        tracing::error!(error = %e, "initial notification fetch failed");
    }

    let mut status_rx = service.subscribe_status();
    let mut feed_rx = service.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            _ = session_ended.notified() => {
                break;
            }
            Ok(()) = status_rx.changed() => {
                let status = status_rx.borrow_and_update().clone();
                tracing::info!(
                    state = %status.state,
                    attempts = status.attempts,
                    last_error = ?status.last_error,
                    "realtime status"
                );
            }
            Ok(()) = feed_rx.changed() => {
                let snapshot = feed_rx.borrow_and_update().clone();
                tracing::info!(
                    cached = snapshot.notifications.len(),
                    unread = snapshot.unread_count,
                    "notifications updated"
                );
            }
        }
    }

    service.stop();
    session.logout();
    Ok(())
}
