use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{
    handler::{
        activate_session, deactivate_session, delete_wallet, get_history, get_polling_state, health_check,
        record_pending, submit_transaction, switch_network, AppState,
    },
    streaming::stream_history,
};

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Session
                .route("/session/activate", post(activate_session))
                .route("/session/deactivate", post(deactivate_session))
                .route("/wallet/:chain/:address", axum::routing::delete(delete_wallet))
                .route("/network/:chain/switch", post(switch_network))
                // History
                .route("/history/:chain/:address", get(get_history))
                .route("/history/:chain/:address/pending", post(record_pending))
                .route("/transactions/submit", post(submit_transaction))
                .route("/polling", get(get_polling_state))
                // Realtime
                .route("/stream", get(stream_history)),
        )
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
