//! Primary chat stream task
//!
//! One task per outgoing message: POST the request, decode the response
//! body frame by frame, and forward each typed event over an unbounded
//! channel tagged with the stream id that issued it. The session applies
//! updates on its own task and discards ids it no longer owns.
//!
//! Every exit path ends with exactly one [`ChatStreamUpdate::Closed`],
//! except cooperative cancellation, which stops the task silently.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::add_auth_header;
use crate::api::models::{ChatImageRequest, ChatRequest};
use crate::core::events::StreamEvent;
use crate::core::sse::{decode_stream_event, FrameDecoder};
use crate::utils::url::construct_api_url;

#[derive(Clone, Debug)]
pub enum ChatStreamUpdate {
    Event(StreamEvent),
    /// The stream is over, successfully or not. Always the last update for
    /// a stream id.
    Closed,
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub token: String,
    pub character_id: String,
    pub message: String,
    pub image_base64: Option<String>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

type UpdateSender = mpsc::UnboundedSender<(ChatStreamUpdate, u64)>;

#[derive(Clone)]
pub struct ChatStreamService {
    tx: UpdateSender,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ChatStreamUpdate, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let cancel_token = params.cancel_token.clone();
            tokio::select! {
                _ = run_stream(params, tx) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }
}

fn send_error(tx: &UpdateSender, stream_id: u64, message: String) {
    let _ = tx.send((ChatStreamUpdate::Event(StreamEvent::Error { message }), stream_id));
    let _ = tx.send((ChatStreamUpdate::Closed, stream_id));
}

async fn run_stream(params: StreamParams, tx: UpdateSender) {
    let StreamParams {
        client,
        base_url,
        token,
        character_id,
        message,
        image_base64,
        cancel_token,
        stream_id,
    } = params;

    // Text-only and image-bearing sends differ only in endpoint and body.
    let request = match image_base64 {
        Some(image_base64) => client
            .post(construct_api_url(&base_url, "api/chat/image"))
            .json(&ChatImageRequest {
                message,
                character_id,
                image_base64,
            }),
        None => client
            .post(construct_api_url(&base_url, "api/chat"))
            .json(&ChatRequest {
                message,
                character_id,
            }),
    };

    let response = match add_auth_header(request, &token).send().await {
        Ok(response) => response,
        Err(err) => {
            // Transport failure becomes a terminal error event; nothing is
            // thrown past the session boundary.
            send_error(&tx, stream_id, format!("connection failed: {err}"));
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        send_error(&tx, stream_id, format!("HTTP {status}: {body}"));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut decoder = FrameDecoder::new();

    while let Some(chunk) = stream.next().await {
        if cancel_token.is_cancelled() {
            return;
        }

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                send_error(&tx, stream_id, format!("stream read failed: {err}"));
                return;
            }
        };

        for frame in decoder.feed(&chunk) {
            if let Some(event) = decode_stream_event(&frame) {
                let terminal = event.is_terminal();
                let _ = tx.send((ChatStreamUpdate::Event(event), stream_id));
                if terminal {
                    // No events are valid after done/error.
                    let _ = tx.send((ChatStreamUpdate::Closed, stream_id));
                    return;
                }
            }
        }
    }

    // EOF: flush whatever the last chunk left behind, then close.
    if let Some(frame) = decoder.finish() {
        if let Some(event) = decode_stream_event(&frame) {
            let _ = tx.send((ChatStreamUpdate::Event(event), stream_id));
        }
    }
    let _ = tx.send((ChatStreamUpdate::Closed, stream_id));
}
