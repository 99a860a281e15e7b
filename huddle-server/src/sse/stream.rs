//! Client event stream endpoint
//!
//! `GET /api/stream` opens a persistent SSE connection. The handshake
//! returns immediately; a spawned task then delivers the snapshot
//! (counts, graph and saved snapshots to everyone, recent statements to
//! the new client only). Snapshot frames and live frames travel through
//! the same per-sink channel, so the new client sees the snapshot first.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::IntoResponse,
};
use huddle_common::db;
use huddle_common::events::{name, Pairing, RecentLine, Summary};
use tracing::{debug, info, warn};

use crate::engine::{graph, text::extract_text};
use crate::sse::bus::{SubscriberId, Subscription};
use crate::sse::notify;
use crate::state::AppState;

/// Heartbeat comment interval; keeps idle connections alive through
/// intermediary proxies.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Client reconnect hint, sent once per connection.
const RETRY_HINT: &[u8] = b"retry: 3000\n\n";

/// GET /api/stream - SSE event stream
pub async fn event_stream(State(state): State<AppState>) -> impl IntoResponse {
    let (id, mut rx) = state.bus.subscribe();
    info!(
        "New SSE client connected, total clients: {}",
        state.bus.subscriber_count()
    );

    // Snapshot runs after the handshake completes, off this handler.
    let snapshot_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = send_snapshot(&snapshot_state, id).await {
            warn!("Snapshot for subscriber {} failed: {}", id, e);
        }
    });

    let guard = Subscription::new(state.bus.clone(), id);
    let stream = async_stream::stream! {
        // Held for the stream's lifetime; dropping the stream (client
        // disconnect) unsubscribes the sink and stops the heartbeat.
        let _guard = guard;
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // first tick completes immediately

        yield Ok::<_, Infallible>(Bytes::from_static(RETRY_HINT));
        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => yield Ok(frame),
                    None => break,
                },
                _ = heartbeat.tick() => {
                    debug!("SSE: sending heartbeat");
                    yield Ok(Bytes::from_static(b": heartbeat\n\n"));
                }
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
}

/// Snapshot-on-connect: counts and graph to all subscribers, then the
/// run's saved summary/pairing to all, then recent statements privately
/// to the new client.
async fn send_snapshot(state: &AppState, subscriber: SubscriberId) -> huddle_common::Result<()> {
    let run_id = state.runs.current_run_id(&state.db).await?;

    notify::broadcast_submission_count(state, run_id).await?;
    notify::broadcast_participant_count(state).await?;
    graph::build_and_broadcast(state).await?;

    if let Some(run) = db::get_run(&state.db, run_id).await? {
        if let Some(json) = run.clusters_json {
            match serde_json::from_str::<Summary>(&json) {
                Ok(summary) => state.bus.publish(name::SUMMARY, &summary),
                Err(e) => warn!("Skipping unparsable saved summary for run {}: {}", run_id, e),
            }
        }
        if let Some(json) = run.pairs_json {
            match serde_json::from_str::<Pairing>(&json) {
                Ok(pairing) => state.bus.publish(name::MATCHES, &pairing),
                Err(e) => warn!("Skipping unparsable saved pairing for run {}: {}", run_id, e),
            }
        }
    }

    let recent = db::recent_submissions(&state.db, run_id, state.engine.recent_lines as i64).await?;
    let lines: Vec<RecentLine> = recent
        .iter()
        .map(|s| {
            let payload = serde_json::from_str(&s.payload_json).unwrap_or(serde_json::Value::Null);
            RecentLine {
                submission_id: s.id,
                participant_id: s.participant_id,
                text: extract_text(&payload),
            }
        })
        .collect();
    state.bus.send_to(subscriber, name::RECENT_LINES, &lines);

    Ok(())
}
