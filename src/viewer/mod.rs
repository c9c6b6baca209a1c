//! Live stream viewer.
//!
//! A viewer opens one connection to the relay, subscribes to a single stream
//! once the socket is open, and renders every line it receives into an
//! append-only, numbered log.
//!
//! # Architecture
//!
//! - [`ViewerSession`]: all viewer state, moving from `Connecting` to `Subscribed`
//! - [`SubscribeBackoff`]: linearly growing delays between open-state checks
//! - [`LogView`]: the numbered rows rendered so far
//! - [`Surface`]: where rendering lands ([`MemorySurface`], [`TerminalSurface`])
//! - [`client`]: drives a session over a websocket [`client::Link`]
//!
//! # Example
//!
//! ```rust
//! use shout::viewer::{MemorySurface, ViewerSession};
//!
//! let mut session = ViewerSession::new("abc123", MemorySurface::default());
//! session.handle_frame(r#"{"subscribe":"ok"}"#).unwrap();
//! session.handle_frame(r#"{"payload":"line one"}"#).unwrap();
//!
//! assert_eq!(session.surface().status_text, "Connected!");
//! assert!(!session.surface().status_visible);
//! assert_eq!(session.log().rows()[0].text, "line one");
//! ```

mod backoff;
pub mod client;
mod log;
mod session;
mod surface;
mod terminal;

pub use backoff::{CONNECT_STEP, SubscribeBackoff};
pub use log::{LogRow, LogView};
pub use session::{CONNECTED_MESSAGE, Phase, Rendered, SubscribeStep, ViewerSession};
pub use surface::{MemorySurface, Surface};
pub use terminal::TerminalSurface;
