//! Server-Sent Events for lead tier activity
//!
//! Streams every [`LeadEvent`] published on the event bus. Lagging clients
//! skip missed events and keep streaming.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use leadgen_common::events::LeadEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn to_sse(event: &LeadEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}

/// GET /api/progressions/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to progression events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Some(sse) = to_sse(&event) {
                            debug!("SSE: sending {}", event.event_type());
                            yield Ok(sse);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE client lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Event bus closed, ending SSE stream");
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("keep-alive"))
}
