use std::io::{self, BufWriter, Stderr, Stdout, Write};

use tracing::warn;

use super::log::LogRow;
use super::surface::Surface;

/// Renders rows to one writer and status lines to another.
///
/// Rows are buffered; bringing a row into view flushes them. With autoscroll
/// off the buffered rows show up the next time something is flushed.
#[derive(Debug)]
pub struct TerminalSurface<W: Write, E: Write> {
    rows: BufWriter<W>,
    status: E,
    gutter_width: usize,
    status_visible: bool,
}

impl TerminalSurface<Stdout, Stderr> {
    /// Rows on stdout, status on stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<W: Write, E: Write> TerminalSurface<W, E> {
    pub fn new(rows: W, status: E) -> Self {
        Self {
            rows: BufWriter::new(rows),
            status,
            gutter_width: 6,
            status_visible: false,
        }
    }

    #[must_use]
    pub fn status_visible(&self) -> bool {
        self.status_visible
    }

    /// Flush buffered rows and hand back both writers.
    pub fn into_inner(self) -> io::Result<(W, E)> {
        let rows = self.rows.into_inner().map_err(io::IntoInnerError::into_error)?;
        Ok((rows, self.status))
    }

    fn write_status(&mut self, text: &str) {
        if let Err(e) = writeln!(self.status, "{text}") {
            warn!(name: "viewer.terminal.write_failed", error = %e, "Status write failed");
        }
    }
}

impl<W: Write, E: Write> Surface for TerminalSurface<W, E> {
    fn show_status(&mut self, text: &str) {
        self.status_visible = true;
        self.write_status(&format!("-- {text}"));
    }

    fn hide_status(&mut self) {
        self.status_visible = false;
    }

    fn set_source_command(&mut self, command: &str) {
        self.write_status(&format!("$ {command}"));
    }

    fn append_row(&mut self, row: &LogRow) {
        // The payload usually carries its own newline; one per row is enough.
        let text = row.text.strip_suffix('\n').unwrap_or(&row.text);
        let text = text.strip_suffix('\r').unwrap_or(text);
        let width = self.gutter_width;
        if let Err(e) = writeln!(self.rows, "{:>width$} │ {text}", row.line_no) {
            warn!(name: "viewer.terminal.write_failed", error = %e, "Row write failed");
        }
    }

    fn scroll_into_view(&mut self, _row: &LogRow) {
        if let Err(e) = self.rows.flush() {
            warn!(name: "viewer.terminal.write_failed", error = %e, "Flush failed");
        }
    }

    fn show_autoscroll(&mut self, enabled: bool) {
        let state = if enabled { "on" } else { "off" };
        self.write_status(&format!("-- autoscroll {state}"));
    }
}
