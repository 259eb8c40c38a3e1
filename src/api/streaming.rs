use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::StreamQuery;
use crate::api::handler::AppState;
use crate::cache::HistoryEvent;

/// GET /stream
pub async fn stream_history(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(filter): Query<StreamQuery>,
) -> impl IntoResponse {
    let events = BroadcastStream::new(state.sessions.subscribe());
    ws.on_upgrade(move |socket| handle_history_stream(socket, events, filter))
}

fn matches(filter: &StreamQuery, event: &HistoryEvent) -> bool {
    filter.chain.map_or(true, |chain| chain == event.chain())
        && filter
            .address
            .as_deref()
            .map_or(true, |address| address == event.address())
}

async fn handle_history_stream(socket: WebSocket, mut events: BroadcastStream<HistoryEvent>, filter: StreamQuery) {
    let connection = Uuid::new_v4();
    info!("📡 History stream {} opened", connection);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("History stream {} read error: {}", connection, e);
                        break;
                    }
                    _ => {}
                }
            }
            event = events.next() => {
                let event = match event {
                    Some(Ok(event)) => event,
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!("History stream {} lagged, {} events skipped", connection, skipped);
                        continue;
                    }
                    None => break,
                };

                if !matches(&filter, &event) {
                    continue;
                }

                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode {} event: {}", event.kind(), e);
                        continue;
                    }
                };

                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("History stream {} closed", connection);
}
