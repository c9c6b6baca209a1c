//! Run a command and shout its stdout.
//!
//! The producer registers a stream with the relay, prints the page viewers
//! should open, waits a little so they can attach, then relays the command's
//! output line by line while pinging in the background.

use std::io::Write;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Result, ShoutError};
use crate::protocol::{ClientFrame, StreamAssigned, ViewerInbound};
use crate::viewer::client::ws_url;

/// Upper bound on the relay handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest line relayed; longer output is rejected by the codec.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// What a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub stream_id: String,
    pub lines: u64,
    pub status: ExitStatus,
}

/// Options for one producer run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Relay address as `host:port`.
    pub host: String,
    pub secure: bool,
    /// Pause between registering and starting the command.
    pub delay: Duration,
    pub ping_interval: Duration,
}

impl RunOptions {
    pub fn from_config(client: &ClientConfig) -> Self {
        Self {
            host: client.host.clone(),
            secure: client.secure,
            delay: client.delay(),
            ping_interval: client.ping_interval(),
        }
    }

    #[must_use]
    pub fn page_url(&self, stream_id: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}/{stream_id}", self.host)
    }
}

/// Register a stream, run `command`, and relay its output.
///
/// Every line is echoed to `out` as well as sent to the relay.
pub async fn run<W: Write + Send>(
    options: &RunOptions,
    command: &[String],
    out: &mut W,
) -> Result<RunSummary> {
    let Some((program, args)) = command.split_first() else {
        return Err(ShoutError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no command given",
        )));
    };

    let url = ws_url(&options.host, options.secure)?;
    let (ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
        .await
        .map_err(|elapsed| ShoutError::Handshake(format!("connecting to {url}: {elapsed}")))??;
    let (mut sink, mut stream) = ws.split();

    // Registration happens before anything else shares the socket.
    let source_command = command.join(" ");
    sink.send(Message::text(
        ClientFrame::initialize(Some(source_command.clone())).to_json(),
    ))
    .await?;
    let stream_id = read_stream_id(&mut stream).await?;
    info!(name: "producer.stream.registered", stream_id = %stream_id, command = %source_command, "Stream registered");
    writeln!(out, "Page: {}", options.page_url(&stream_id))?;
    out.flush()?;

    // Egress: everything after registration goes through one queue.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sink.send(msg).await {
                warn!(name: "producer.send.failed", error = %e, "Websocket was closed unexpectedly");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Ingest: the relay only answers pings or reports errors.
    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match ViewerInbound::decode(text.as_str()) {
                    Ok(ViewerInbound::Error(body)) => {
                        warn!(name: "producer.relay.error", error = %body.status_line(), "Relay reported an error");
                    }
                    _ => debug!(name: "producer.relay.frame", frame = %text.as_str(), "Relay frame"),
                },
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    let pinger = tokio::spawn(ping_loop(tx.clone(), options.ping_interval, stop_rx));

    tokio::time::sleep(options.delay).await;

    let result = relay_output(program, args, &tx, out).await;

    let _ = stop_tx.send(true);
    let _ = pinger.await;
    let _ = tx.send(Message::Close(None));
    drop(tx);
    let _ = writer.await;
    reader.abort();

    let (lines, status) = result?;
    info!(name: "producer.finished", stream_id = %stream_id, lines, status = %status, "Command finished");
    Ok(RunSummary {
        stream_id,
        lines,
        status,
    })
}

async fn read_stream_id<S>(stream: &mut S) -> Result<String>
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Text(text) => {
                return serde_json::from_str::<StreamAssigned>(text.as_str())
                    .map(|assigned| assigned.stream_id)
                    .map_err(|e| {
                        ShoutError::Handshake(format!(
                            "error initiating stream: {} ({e})",
                            text.as_str()
                        ))
                    });
            }
            Message::Close(_) => return Err(ShoutError::Closed),
            _ => {}
        }
    }
    Err(ShoutError::Closed)
}

/// Spawn the command and send each stdout line as a payload.
async fn relay_output<W: Write>(
    program: &str,
    args: &[String],
    tx: &mpsc::UnboundedSender<Message>,
    out: &mut W,
) -> Result<(u64, ExitStatus)> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;

    let lines = FramedRead::new(
        stdout,
        LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
    );
    let count = match forward_lines(lines, tx, out).await {
        Ok(count) => count,
        Err(e) => {
            let _ = child.kill().await;
            return Err(e);
        }
    };

    let status = child.wait().await?;
    Ok((count, status))
}

/// Echo each line locally and queue it for the relay, newline restored.
async fn forward_lines<R, W>(
    mut lines: FramedRead<R, LinesCodec>,
    tx: &mpsc::UnboundedSender<Message>,
    out: &mut W,
) -> Result<u64>
where
    R: tokio::io::AsyncRead + Unpin,
    W: Write,
{
    let mut count = 0u64;
    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| std::io::Error::other(e.to_string()))?;
        let line = format!("{line}\n");
        out.write_all(line.as_bytes())?;
        out.flush()?;
        if tx
            .send(Message::text(ClientFrame::payload(line).to_json()))
            .is_err()
        {
            return Err(ShoutError::Closed);
        }
        count += 1;
    }
    Ok(count)
}

/// Ping until told to stop, so long-running commands keep the stream alive.
async fn ping_loop(
    tx: mpsc::UnboundedSender<Message>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                if tx.send(Message::text(ClientFrame::ping().to_json())).is_err() {
                    warn!(name: "producer.ping.failed", "Ping Error... Unable to send ping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url() {
        let options = RunOptions {
            host: "localhost:3000".to_string(),
            secure: false,
            delay: Duration::ZERO,
            ping_interval: Duration::from_secs(10),
        };
        assert_eq!(options.page_url("abcd"), "http://localhost:3000/abcd");
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let options = RunOptions {
            host: "localhost:1".to_string(),
            secure: false,
            delay: Duration::ZERO,
            ping_interval: Duration::from_secs(10),
        };
        let err = run(&options, &[], &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, ShoutError::Io(_)));
    }

    #[tokio::test]
    async fn test_unreadable_output_kills_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!(r#"printf '\377\n'; sleep 1; touch '{}'"#, marker.display());
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = relay_output("sh", &["-c".to_string(), script], &tx, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShoutError::Io(_)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_forwarded_lines_keep_their_newline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut out = Vec::new();
        let (lines, status) =
            relay_output("printf", &["one\\ntwo".to_string()], &tx, &mut out)
                .await
                .unwrap();
        assert_eq!(lines, 2);
        assert!(status.success());
        assert_eq!(String::from_utf8(out).unwrap(), "one\ntwo\n");
        assert_eq!(
            rx.try_recv().unwrap(),
            Message::text(r#"{"payload":"one\n"}"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_loop_stops_on_signal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let pinger = tokio::spawn(ping_loop(tx, Duration::from_secs(10), stop_rx));

        tokio::time::sleep(Duration::from_secs(25)).await;
        stop_tx.send(true).unwrap();
        pinger.await.unwrap();

        let mut pings = 0;
        while let Ok(msg) = rx.try_recv() {
            assert_eq!(msg, Message::text(r#"{"ping":"ping"}"#));
            pings += 1;
        }
        // Ticks at 0s, 10s and 20s.
        assert_eq!(pings, 3);
    }
}
