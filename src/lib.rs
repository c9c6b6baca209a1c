//! shout
//!
//! Pipe a command's output to anyone watching, live.
//!
//! # Architecture
//!
//! - **Producer**: runs a command and pushes each stdout line to the relay
//! - **Relay**: Axum websocket server that assigns stream ids and fans lines out
//! - **Viewer**: subscribes to one stream and renders a numbered, scrolling log
//!
//! # Modules
//!
//! - [`protocol`]: JSON envelopes exchanged over `/api/ws`
//! - [`hub`]: relay-side registry of connections and streams
//! - [`server`]: HTTP routes, websocket handling, pages
//! - [`viewer`]: viewer session, rendering surfaces and websocket driver
//! - [`producer`]: command runner that feeds a stream
//! - [`config`]: CLI and layered configuration

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod hub;
pub mod keys;
pub mod pages;
pub mod producer;
pub mod protocol;
pub mod server;
pub mod viewer;

pub use error::{Result, ShoutError};

use crate::config::AppConfig;
use hub::StreamHub;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Registry of live streams and connections.
    pub hub: StreamHub,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
