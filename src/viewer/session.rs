use std::time::Duration;

use tracing::{debug, info};

use super::backoff::SubscribeBackoff;
use super::log::{LogView, LogRow};
use super::surface::Surface;
use crate::error::Result;
use crate::protocol::{ClientFrame, ViewerInbound};

/// Status text shown once the relay confirms the subscription.
pub const CONNECTED_MESSAGE: &str = "Connected!";

/// Where the session is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the socket to open; `attempts` open-state checks so far.
    Connecting { attempts: u32 },
    /// The subscribe request went out; frames are rendered as they arrive.
    Subscribed,
}

/// Outcome of one open-state check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeStep {
    /// Send this frame now.
    Send(ClientFrame),
    /// Check again after this delay.
    RetryAfter(Duration),
    /// Already subscribed.
    Done,
}

/// What a frame did to the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Status area revealed with this text.
    Status(String),
    /// Row appended.
    Row(LogRow),
}

/// All mutable state of one viewer.
#[derive(Debug)]
pub struct ViewerSession<S> {
    stream_id: String,
    surface: S,
    log: LogView,
    autoscroll: bool,
    phase: Phase,
    backoff: SubscribeBackoff,
}

impl<S: Surface> ViewerSession<S> {
    /// Start a session for `stream_id`. Autoscroll starts enabled.
    pub fn new(stream_id: impl Into<String>, surface: S) -> Self {
        Self::with_backoff(stream_id, surface, SubscribeBackoff::default())
    }

    pub fn with_backoff(
        stream_id: impl Into<String>,
        mut surface: S,
        backoff: SubscribeBackoff,
    ) -> Self {
        surface.show_autoscroll(true);
        Self {
            stream_id: stream_id.into(),
            surface,
            log: LogView::new(),
            autoscroll: true,
            phase: Phase::Connecting { attempts: 0 },
            backoff,
        }
    }

    /// Delay before the first open-state check.
    pub fn first_check_delay(&mut self) -> Duration {
        match self.backoff.current() {
            Some(current) => current,
            None => self.backoff.next().unwrap_or_default(),
        }
    }

    /// Check whether the subscribe request can go out.
    pub fn poll_subscribe(&mut self, open: bool) -> SubscribeStep {
        let Phase::Connecting { attempts } = self.phase else {
            return SubscribeStep::Done;
        };

        if open {
            info!(
                name: "viewer.subscribe.sent",
                stream_id = %self.stream_id,
                attempts = attempts + 1,
                "Subscribing"
            );
            self.phase = Phase::Subscribed;
            return SubscribeStep::Send(ClientFrame::subscribe(self.stream_id.clone()));
        }

        self.phase = Phase::Connecting {
            attempts: attempts + 1,
        };
        let delay = self.backoff.next().unwrap_or_default();
        debug!(
            name: "viewer.subscribe.waiting",
            attempts = attempts + 1,
            retry_ms = delay.as_millis(),
            "Waiting for socket connection"
        );
        SubscribeStep::RetryAfter(delay)
    }

    /// Decode and render one text frame from the relay.
    pub fn handle_frame(&mut self, text: &str) -> Result<Rendered> {
        let inbound = ViewerInbound::decode(text)?;
        Ok(self.apply(inbound))
    }

    /// Render one decoded frame.
    pub fn apply(&mut self, inbound: ViewerInbound) -> Rendered {
        match inbound {
            ViewerInbound::Subscribed { source_command } => {
                info!(name: "viewer.subscribe.confirmed", stream_id = %self.stream_id, "Subscribe confirmed");
                self.surface.show_status(CONNECTED_MESSAGE);
                if let Some(command) = source_command {
                    self.surface.set_source_command(&command);
                }
                Rendered::Status(CONNECTED_MESSAGE.to_string())
            }
            ViewerInbound::Error(body) => {
                let line = body.status_line();
                self.surface.show_status(&line);
                Rendered::Status(line)
            }
            ViewerInbound::Line { payload } => {
                self.surface.hide_status();
                let row = self.log.push(payload).clone();
                self.surface.append_row(&row);
                if self.autoscroll {
                    self.surface.scroll_into_view(&row);
                }
                Rendered::Row(row)
            }
        }
    }

    /// Flip autoscroll and swap the indicators. Returns the new value.
    pub fn toggle_autoscroll(&mut self) -> bool {
        self.autoscroll = !self.autoscroll;
        self.surface.show_autoscroll(self.autoscroll);
        self.autoscroll
    }

    #[must_use]
    pub fn autoscroll(&self) -> bool {
        self.autoscroll
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    #[must_use]
    pub fn log(&self) -> &LogView {
        &self.log
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}
