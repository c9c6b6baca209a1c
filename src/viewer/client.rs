//! Drives a [`ViewerSession`] over a live connection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::session::{SubscribeStep, ViewerSession};
use super::surface::Surface;
use crate::error::{Result, ShoutError};

/// Fixed websocket path on the relay.
pub const WS_PATH: &str = "/api/ws";

/// Socket lifecycle as seen by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

/// A full-duplex text connection.
#[async_trait]
pub trait Link: Send {
    /// Whether frames can be sent right now.
    fn is_open(&self) -> bool;

    /// Queue one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound text frame; `None` once the connection is gone.
    async fn recv(&mut self) -> Option<String>;
}

/// `ws(s)://<host>/api/ws`.
pub fn ws_url(host: &str, secure: bool) -> Result<Url> {
    let scheme = if secure { "wss" } else { "ws" };
    Ok(Url::parse(&format!("{scheme}://{host}{WS_PATH}"))?)
}

/// Websocket link whose handshake runs in the background.
///
/// [`Link::is_open`] stays false until the handshake completes; if it fails
/// the link reports `Closed` and never opens.
#[derive(Debug)]
pub struct WsLink {
    state: watch::Receiver<ReadyState>,
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl WsLink {
    /// Start connecting to `url` and return immediately.
    pub fn open(url: Url) -> Self {
        let (state_tx, state) = watch::channel(ReadyState::Connecting);
        let (outbound, out_rx) = mpsc::unbounded_channel();
        let (in_tx, inbound) = mpsc::unbounded_channel();
        tokio::spawn(pump(url, state_tx, out_rx, in_tx));
        Self {
            state,
            outbound,
            inbound,
        }
    }

    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }
}

async fn pump(
    url: Url,
    state: watch::Sender<ReadyState>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(name: "viewer.connect.failed", url = %url, error = %e, "Websocket connection failed");
            let _ = state.send(ReadyState::Closed);
            return;
        }
    };
    info!(name: "viewer.connect.open", url = %url, "Socket connection confirmed");
    let _ = state.send(ReadyState::Open);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            Some(text) = outbound.recv() => {
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(name: "viewer.send.failed", error = %e, "Send failed");
                    break;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(name: "viewer.connect.closed", frame = ?frame, "Relay closed the socket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(name: "viewer.recv.failed", error = %e, "Receive failed");
                    break;
                }
                None => break,
            },
        }
    }
    let _ = state.send(ReadyState::Closed);
}

#[async_trait]
impl Link for WsLink {
    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.outbound.send(text).is_err() {
            return Err(ShoutError::Closed);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }
}

/// Run a session until its connection ends.
///
/// The subscribe request goes out at the first open-state check that finds
/// the link open; checks are spaced by the session's backoff. Every inbound
/// frame is rendered as it arrives; a frame that fails to decode is logged
/// and skipped. Each item on `toggles` flips autoscroll.
///
/// While still connecting, a dead link does not end the run: the checks keep
/// going. Once subscribed, the run ends when the link closes.
pub async fn run<L, S>(
    mut link: L,
    mut session: ViewerSession<S>,
    mut toggles: mpsc::UnboundedReceiver<()>,
) -> Result<ViewerSession<S>>
where
    L: Link,
    S: Surface + Send,
{
    let retry = sleep_until(Instant::now() + session.first_check_delay());
    tokio::pin!(retry);
    let mut subscribing = true;
    let mut link_alive = true;
    let mut toggles_alive = true;

    loop {
        tokio::select! {
            () = &mut retry, if subscribing => {
                match session.poll_subscribe(link.is_open()) {
                    SubscribeStep::Send(frame) => {
                        link.send_text(frame.to_json()).await?;
                        subscribing = false;
                    }
                    SubscribeStep::RetryAfter(delay) => {
                        retry.as_mut().reset(Instant::now() + delay);
                    }
                    SubscribeStep::Done => subscribing = false,
                }
            }
            frame = link.recv(), if link_alive => match frame {
                Some(text) => {
                    if let Err(e) = session.handle_frame(&text) {
                        warn!(name: "viewer.frame.invalid", error = %e, frame = %text, "Dropping undecodable frame");
                    }
                }
                None if subscribing => link_alive = false,
                None => break,
            },
            toggle = toggles.recv(), if toggles_alive => match toggle {
                Some(()) => {
                    let enabled = session.toggle_autoscroll();
                    debug!(name: "viewer.autoscroll.toggled", enabled, "Autoscroll toggled");
                }
                None => toggles_alive = false,
            },
            else => break,
        }
    }

    info!(name: "viewer.closed", rows = session.log().len(), "Stream closed");
    Ok(session)
}
