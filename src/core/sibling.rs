//! Sibling Channel Manager
//!
//! Keeps one long-lived, inbound-only stream open against
//! `GET /api/sibling/events` and forwards decoded [`SiblingEvent`]s to the
//! session's owner. No outbound message ever triggers this channel; it is
//! the other companion talking on her own schedule.
//!
//! Lifecycle: `Idle -> Connecting -> Connected -> ReconnectPending -> ...`
//! with a fixed delay between attempts (no backoff). Without a credential
//! the manager stays `Idle`; there is no retry loop that could hammer the
//! backend unauthenticated. Shutdown cancels cooperatively and is never
//! reported as an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::add_auth_header;
use crate::core::character::ActiveCharacter;
use crate::core::events::SiblingEvent;
use crate::core::sse::{decode_sibling_event, FrameDecoder};
use crate::utils::url::construct_api_url;

pub const SIBLING_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    ReconnectPending,
}

pub struct SiblingChannelConfig {
    pub client: reqwest::Client,
    pub base_url: String,
    /// Credential read at activation. `None` keeps the channel `Idle`.
    pub token: Option<String>,
    /// Read at each connection attempt, so a character switch takes effect
    /// on the next connect without restarting the manager.
    pub active_character: ActiveCharacter,
    pub reconnect_delay: Duration,
}

impl SiblingChannelConfig {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: Option<String>,
        active_character: ActiveCharacter,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token,
            active_character,
            reconnect_delay: SIBLING_RECONNECT_DELAY,
        }
    }
}

pub struct SiblingChannel {
    state: Arc<Mutex<ChannelState>>,
    cancel: CancellationToken,
}

impl SiblingChannel {
    /// Activate the channel. Events arrive on the returned receiver until
    /// [`shutdown`](Self::shutdown).
    pub fn spawn(config: SiblingChannelConfig) -> (Self, mpsc::UnboundedReceiver<SiblingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ChannelState::Idle));
        let cancel = CancellationToken::new();

        let channel = Self {
            state: Arc::clone(&state),
            cancel: cancel.clone(),
        };

        tokio::spawn(run_channel(config, tx, state, cancel));
        (channel, rx)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock().expect("sibling state lock")
    }

    /// Cooperative teardown: aborts any in-flight request and clears the
    /// pending reconnect. Mandatory on unmount/character-view change so
    /// connections never leak.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SiblingChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn set_state(state: &Mutex<ChannelState>, next: ChannelState) {
    *state.lock().expect("sibling state lock") = next;
}

async fn run_channel(
    config: SiblingChannelConfig,
    tx: mpsc::UnboundedSender<SiblingEvent>,
    state: Arc<Mutex<ChannelState>>,
    cancel: CancellationToken,
) {
    let Some(token) = config.token.clone() else {
        debug!("sibling channel staying idle: no credential");
        return;
    };
    // One live connection attempt per manager instance.
    let in_flight = AtomicBool::new(false);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if !in_flight.swap(true, Ordering::SeqCst) {
            set_state(&state, ChannelState::Connecting);
            tokio::select! {
                _ = connect_and_read(&config, &token, &tx, &state, &cancel) => {}
                _ = cancel.cancelled() => {
                    in_flight.store(false, Ordering::SeqCst);
                    break;
                }
            }
            in_flight.store(false, Ordering::SeqCst);
        }

        if cancel.is_cancelled() {
            break;
        }

        set_state(&state, ChannelState::ReconnectPending);
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = cancel.cancelled() => break,
        }
    }

    set_state(&state, ChannelState::Idle);
}

/// One connection attempt plus its read loop. Returns when the stream ends
/// for any reason; the caller decides whether to reconnect.
async fn connect_and_read(
    config: &SiblingChannelConfig,
    token: &str,
    tx: &mpsc::UnboundedSender<SiblingEvent>,
    state: &Mutex<ChannelState>,
    cancel: &CancellationToken,
) {
    let character_id = config.active_character.get();
    let url = construct_api_url(&config.base_url, "api/sibling/events");
    let request = config
        .client
        .get(url)
        .query(&[("character_id", character_id.as_str())]);

    let response = match add_auth_header(request, token).send().await {
        Ok(response) => response,
        Err(err) => {
            if cancel.is_cancelled() {
                debug!("sibling connect aborted during shutdown");
            } else {
                warn!("sibling channel connect failed: {err}");
            }
            return;
        }
    };

    if !response.status().is_success() {
        warn!("sibling channel rejected: HTTP {}", response.status());
        return;
    }

    set_state(state, ChannelState::Connected);
    debug!("sibling channel connected for {character_id}");

    let mut stream = response.bytes_stream();
    let mut decoder = FrameDecoder::new();

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return;
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                if cancel.is_cancelled() {
                    debug!("sibling read aborted during shutdown");
                } else {
                    warn!("sibling channel read failed: {err}");
                }
                return;
            }
        };
        for frame in decoder.feed(&chunk) {
            if let Some(event) = decode_sibling_event(&frame) {
                let _ = tx.send(event);
            }
        }
    }

    // The channel is unbounded; EOF only ever means the transport dropped.
    if let Some(frame) = decoder.finish() {
        if let Some(event) = decode_sibling_event(&frame) {
            let _ = tx.send(event);
        }
    }
    debug!("sibling channel stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::utils::test_utils::{serve_responses, sse_body, FixtureResponse};

    fn test_config(base_url: String, token: Option<&str>) -> SiblingChannelConfig {
        SiblingChannelConfig {
            client: reqwest::Client::new(),
            base_url,
            token: token.map(str::to_string),
            active_character: ActiveCharacter::new("naruen"),
            reconnect_delay: Duration::from_millis(150),
        }
    }

    #[tokio::test]
    async fn without_credential_the_channel_stays_idle() {
        let fixture = serve_responses(vec![FixtureResponse::ok(String::new())]).await;
        let (channel, mut rx) = SiblingChannel::spawn(test_config(fixture.base_url(), None));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(fixture.requests().is_empty(), "no connection attempts");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_arrive_and_heartbeats_are_discarded() {
        let body = format!(
            "event: heartbeat\ndata: {{}}\n\n{}",
            sse_body(&[
                r#"{"type":"sibling_speak","content":"psst","speaker":"narin","speaker_name":"Narin"}"#,
                r#"{"type":"sibling_typing"}"#,
            ])
        );
        let fixture = serve_responses(vec![FixtureResponse::ok(body)]).await;
        let (channel, mut rx) = SiblingChannel::spawn(test_config(fixture.base_url(), Some("tok")));

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event before timeout")
            .expect("channel open");
        match first {
            SiblingEvent::SiblingSpeak { content, .. } => assert_eq!(content, "psst"),
            other => panic!("expected sibling_speak first, got {other:?}"),
        }
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event before timeout")
            .expect("channel open");
        assert_eq!(second, SiblingEvent::SiblingTyping);

        channel.shutdown();
    }

    #[tokio::test]
    async fn eof_schedules_reconnect_after_the_fixed_delay() {
        // Two responses: the fixture accepts a second connection only
        // after the first stream ends.
        let fixture = serve_responses(vec![
            FixtureResponse::ok(sse_body(&[
                r#"{"type":"sibling_speak","content":"first"}"#,
            ])),
            FixtureResponse::ok(sse_body(&[
                r#"{"type":"sibling_speak","content":"second"}"#,
            ])),
        ])
        .await;

        let config = test_config(fixture.base_url(), Some("tok"));
        let delay = config.reconnect_delay;
        let started = Instant::now();
        let (channel, mut rx) = SiblingChannel::spawn(config);

        let mut contents = Vec::new();
        while contents.len() < 2 {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("reconnect within timeout")
                .expect("channel open");
            if let SiblingEvent::SiblingSpeak { content, .. } = event {
                contents.push(content);
            }
        }
        assert_eq!(contents, ["first", "second"]);

        // The second connection happened after the delay, not immediately.
        let accepts = fixture.accept_instants();
        assert_eq!(accepts.len(), 2);
        assert!(
            accepts[1].duration_since(accepts[0]) >= delay,
            "reconnected after {:?}, expected at least {:?}",
            accepts[1].duration_since(accepts[0]),
            delay
        );
        assert!(started.elapsed() >= delay);

        channel.shutdown();
    }

    #[tokio::test]
    async fn non_success_response_goes_to_reconnect_pending() {
        let fixture = serve_responses(vec![FixtureResponse::status(
            502,
            "Bad Gateway",
            String::new(),
        )])
        .await;
        let config = test_config(fixture.base_url(), Some("tok"));
        let (channel, _rx) = SiblingChannel::spawn(config);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(channel.state(), ChannelState::ReconnectPending);
        channel.shutdown();
    }

    #[tokio::test]
    async fn shutdown_cancels_the_pending_reconnect_and_returns_to_idle() {
        let fixture = serve_responses(vec![FixtureResponse::ok(String::new())]).await;
        let mut config = test_config(fixture.base_url(), Some("tok"));
        config.reconnect_delay = Duration::from_secs(60);
        let (channel, _rx) = SiblingChannel::spawn(config);

        // Wait until the first (empty) stream has come and gone.
        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.state() != ChannelState::ReconnectPending {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("should reach ReconnectPending");

        channel.shutdown();
        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.state() != ChannelState::Idle {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("should settle back to Idle");

        // No second connection attempt was made.
        assert_eq!(fixture.requests().len(), 1);
    }

    #[tokio::test]
    async fn reconnect_uses_the_current_character_id() {
        let fixture = serve_responses(vec![
            FixtureResponse::ok(String::new()),
            FixtureResponse::ok(String::new()),
        ])
        .await;

        let active = ActiveCharacter::new("naruen");
        let mut config = test_config(fixture.base_url(), Some("tok"));
        config.active_character = active.clone();
        let (channel, _rx) = SiblingChannel::spawn(config);

        // Let the first attempt go out, then switch characters while the
        // reconnect is pending.
        tokio::time::timeout(Duration::from_secs(5), async {
            while fixture.requests().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first connection attempt");
        active.set("narin");

        tokio::time::timeout(Duration::from_secs(5), async {
            while fixture.requests().len() < 2 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("second connection attempt");
        channel.shutdown();

        let captured = fixture.requests();
        assert_eq!(captured[0].method, "GET");
        assert!(captured[0].path.contains("character_id=naruen"));
        assert!(captured[1].path.contains("character_id=narin"));
    }
}
