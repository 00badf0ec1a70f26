//! Server-Sent Events (SSE) for process progress streaming

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use kita_common::events::KitaEvent;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Optional `?process_id=` filter
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub process_id: Option<i64>,
}

impl EventFilter {
    fn matches(&self, event: &KitaEvent) -> bool {
        match self.process_id {
            Some(id) => event.process_id() == Some(id),
            None => true,
        }
    }
}

/// GET /api/v1/processes/events - SSE event stream for pipeline progress
///
/// Streams events:
/// - ProcessCreated
/// - ProcessStatusChanged
/// - DocumentationEntryCreated
///
/// A malformed `process_id` is a 400 with the usual `{"error": ...}` body.
pub async fn process_event_stream(
    State(state): State<AppState>,
    query: Result<Query<EventFilter>, QueryRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Query(filter) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    info!(process_id = ?filter.process_id, "New SSE client connected to process events");

    let mut rx = state.event_bus.subscribe();
    let shutdown = state.orchestrator.shutdown_token().clone();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("SSE: Service shutting down, closing stream");
                    break;
                }
                received = rx.recv() => {
                    match received {
                        Ok(event) if filter.matches(&event) => {
                            let event_type = event.event_type().to_string();
                            match serde_json::to_string(&event) {
                                Ok(event_json) => {
                                    debug!("SSE: Broadcasting process event: {}", event_type);
                                    yield Ok(Event::default().event(event_type).data(event_json));
                                }
                                Err(e) => {
                                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE: Client lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}
