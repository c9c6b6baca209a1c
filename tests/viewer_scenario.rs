use async_trait::async_trait;
use shout::viewer::client::{self, Link};
use shout::viewer::{MemorySurface, Phase, ViewerSession};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Link that opens at a fixed instant and records every check and send.
struct ScriptedLink {
    start: Instant,
    open_after: Option<Duration>,
    checks: Arc<Mutex<Vec<Duration>>>,
    sent: Arc<Mutex<Vec<(Duration, String)>>>,
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Link for ScriptedLink {
    fn is_open(&self) -> bool {
        let elapsed = self.start.elapsed();
        self.checks.lock().unwrap().push(elapsed);
        self.open_after.is_some_and(|at| elapsed >= at)
    }

    async fn send_text(&mut self, text: String) -> shout::Result<()> {
        self.sent.lock().unwrap().push((self.start.elapsed(), text));
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }
}

struct Harness {
    checks: Arc<Mutex<Vec<Duration>>>,
    sent: Arc<Mutex<Vec<(Duration, String)>>>,
    frames: mpsc::UnboundedSender<String>,
    toggles: mpsc::UnboundedSender<()>,
    task: tokio::task::JoinHandle<shout::Result<ViewerSession<MemorySurface>>>,
}

fn start(stream_id: &str, open_after: Option<Duration>) -> Harness {
    let checks = Arc::new(Mutex::new(Vec::new()));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let (frames, inbound) = mpsc::unbounded_channel();
    let (toggles, toggle_rx) = mpsc::unbounded_channel();
    let link = ScriptedLink {
        start: Instant::now(),
        open_after,
        checks: Arc::clone(&checks),
        sent: Arc::clone(&sent),
        inbound,
    };
    let session = ViewerSession::new(stream_id, MemorySurface::default());
    let task = tokio::spawn(client::run(link, session, toggle_rx));
    Harness {
        checks,
        sent,
        frames,
        toggles,
        task,
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_checks_back_off_linearly() {
    let h = start("abc123", Some(ms(2800)));

    tokio::time::sleep(ms(4000)).await;

    // 500, then +1000, then +1500.
    assert_eq!(*h.checks.lock().unwrap(), vec![ms(500), ms(1500), ms(3000)]);
    assert_eq!(
        *h.sent.lock().unwrap(),
        vec![(ms(3000), r#"{"subscribe":"abc123"}"#.to_string())]
    );

    drop(h.frames);
    let session = h.task.await.unwrap().unwrap();
    assert_eq!(session.phase(), Phase::Subscribed);
}

#[tokio::test(start_paused = true)]
async fn test_open_at_first_check_sends_immediately() {
    let h = start("s", Some(Duration::ZERO));
    tokio::time::sleep(ms(600)).await;
    assert_eq!(*h.checks.lock().unwrap(), vec![ms(500)]);
    assert_eq!(h.sent.lock().unwrap().len(), 1);
    h.task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_never_open_keeps_checking() {
    let h = start("s", None);
    // A dead link does not stop the checks while connecting.
    drop(h.frames);

    tokio::time::sleep(ms(10_000)).await;
    assert_eq!(
        *h.checks.lock().unwrap(),
        vec![ms(500), ms(1500), ms(3000), ms(5000), ms(7500)]
    );
    assert!(h.sent.lock().unwrap().is_empty());
    assert!(!h.task.is_finished());
    h.task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_run_ends_when_every_source_is_gone() {
    let h = start("s", Some(ms(1000)));
    // The link dies before it opens and nobody can toggle any more.
    drop(h.frames);
    drop(h.toggles);

    let session = h.task.await.unwrap().unwrap();
    assert_eq!(session.phase(), Phase::Subscribed);
    assert_eq!(h.sent.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_scenario() {
    let h = start("abc123", Some(Duration::ZERO));
    tokio::time::sleep(ms(600)).await;
    assert_eq!(h.sent.lock().unwrap()[0].1, r#"{"subscribe":"abc123"}"#);

    h.frames.send(r#"{"subscribe":"ok"}"#.to_string()).unwrap();
    h.frames
        .send(r#"{"payload":"line one"}"#.to_string())
        .unwrap();
    h.frames.send("garbage".to_string()).unwrap();
    h.frames
        .send(r#"{"payload":"line two"}"#.to_string())
        .unwrap();
    tokio::time::sleep(ms(10)).await;
    h.toggles.send(()).unwrap();
    tokio::time::sleep(ms(10)).await;
    drop(h.frames);

    let session = h.task.await.unwrap().unwrap();
    let surface = session.surface();
    assert_eq!(surface.status_text, "Connected!");
    assert!(!surface.status_visible);
    assert_eq!(
        surface.rows,
        vec![(1, "line one".to_string()), (2, "line two".to_string())]
    );
    assert_eq!(surface.scrolled_to, Some(2));
    assert!(!session.autoscroll());
    assert!(surface.autoscroll_off_visible);
}

#[tokio::test(start_paused = true)]
async fn test_error_then_lines_keep_rendering() {
    let h = start("gone", Some(Duration::ZERO));
    tokio::time::sleep(ms(600)).await;

    h.frames
        .send(r#"{"error":{"short":"E1","msg":"boom"}}"#.to_string())
        .unwrap();
    h.frames.send(r#"{"payload":"still here"}"#.to_string()).unwrap();
    h.frames
        .send(r#"{"error":{"short":"E2","msg":"again"}}"#.to_string())
        .unwrap();
    drop(h.frames);

    let session = h.task.await.unwrap().unwrap();
    let surface = session.surface();
    assert!(surface.status_visible);
    assert_eq!(surface.status_text, "[E2] again");
    assert_eq!(surface.rows, vec![(1, "still here".to_string())]);
}
