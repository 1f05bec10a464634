//! Server-sent event framing for the progress and chat channels.
//!
//! A run is spawned with an `mpsc` sender as its event sink. The response
//! body owns the receiver and a [`DropGuard`] over the run's token, so a
//! client disconnect drops the body and cancels the run.

use std::convert::Infallible;
use std::future::Future;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use writeflow_core::WireEvent;

/// Events buffered between a run and a slow client.
pub const CHANNEL_CAPACITY: usize = 64;

/// Frames one event as `event: <name>\ndata: <json>\n\n`.
pub fn frame<E: WireEvent>(event: &E) -> Bytes {
    // serde_json escapes newlines, so the payload stays on one data line.
    Bytes::from(format!("event: {}\ndata: {}\n\n", event.name(), event.data()))
}

/// Spawns `run` with a fresh sender and returns the streaming response.
pub fn spawn_stream<E, F, Fut>(cancel: CancellationToken, run: F) -> Response
where
    E: WireEvent + Send + 'static,
    F: FnOnce(mpsc::Sender<E>, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run(tx, cancel.clone()));
    stream_response(rx, cancel.drop_guard())
}

fn stream_response<E>(rx: mpsc::Receiver<E>, guard: DropGuard) -> Response
where
    E: WireEvent + Send + 'static,
{
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _held = &guard;
        Ok::<_, Infallible>(frame(&event))
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Parses a framed body back into `(event, data)` pairs.
#[cfg(test)]
pub(crate) fn parse_frames(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    name = Some(rest.to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(rest).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use writeflow_core::ChatEvent;

    #[test]
    fn frames_name_and_single_line_json() {
        let event = ChatEvent::ChatStart {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
        };
        let framed = String::from_utf8(frame(&event).to_vec()).expect("utf8");
        assert!(framed.starts_with("event: chat-start\ndata: {"));
        assert!(framed.ends_with("}\n\n"));
        assert_eq!(framed.lines().count(), 2);
        assert_eq!(
            parse_frames(&framed),
            vec![(
                "chat-start".to_string(),
                serde_json::json!({ "provider": "openai", "model": "gpt-4o-mini" })
            )]
        );
    }

    #[test]
    fn multiline_tokens_stay_on_one_data_line() {
        let event = ChatEvent::Token(writeflow_core::progress::TokenChunk {
            chunk: "line one\nline two".into(),
        });
        let framed = String::from_utf8(frame(&event).to_vec()).expect("utf8");
        assert_eq!(framed.lines().count(), 2);
        assert_eq!(parse_frames(&framed)[0].1["chunk"], "line one\nline two");
    }

    #[tokio::test]
    async fn dropping_the_body_cancels_the_run() {
        let cancel = CancellationToken::new();
        let observed = cancel.clone();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let response = spawn_stream::<ChatEvent, _, _>(cancel, |_tx, token| async move {
            let _ = started_tx.send(());
            token.cancelled().await;
        });
        started_rx.await.expect("run started");
        assert!(!observed.is_cancelled());

        drop(response);
        tokio::time::timeout(std::time::Duration::from_secs(1), observed.cancelled())
            .await
            .expect("cancelled after disconnect");
    }
}
