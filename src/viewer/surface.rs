use super::log::LogRow;

/// The page elements a viewer renders into.
///
/// Calls are synchronous and unbatched: every inbound frame maps to an
/// immediate append or text overwrite.
pub trait Surface {
    /// Make the status area visible and replace its text.
    fn show_status(&mut self, text: &str);

    /// Hide the status area.
    fn hide_status(&mut self);

    /// Display the command that feeds the stream.
    fn set_source_command(&mut self, command: &str);

    /// Add a row to the end of the log.
    fn append_row(&mut self, row: &LogRow);

    /// Bring a row into view.
    fn scroll_into_view(&mut self, row: &LogRow);

    /// Show the on-indicator when `enabled`, the off-indicator otherwise.
    fn show_autoscroll(&mut self, enabled: bool);
}

/// A surface that only records what was rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySurface {
    pub status_visible: bool,
    pub status_text: String,
    pub source_command: String,
    /// `(gutter, content)` per row.
    pub rows: Vec<(u64, String)>,
    /// Gutter of the last row scrolled into view.
    pub scrolled_to: Option<u64>,
    pub autoscroll_on_visible: bool,
    pub autoscroll_off_visible: bool,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self {
            status_visible: true,
            status_text: String::new(),
            source_command: String::new(),
            rows: Vec::new(),
            scrolled_to: None,
            autoscroll_on_visible: true,
            autoscroll_off_visible: false,
        }
    }
}

impl Surface for MemorySurface {
    fn show_status(&mut self, text: &str) {
        self.status_visible = true;
        self.status_text = text.to_string();
    }

    fn hide_status(&mut self) {
        self.status_visible = false;
    }

    fn set_source_command(&mut self, command: &str) {
        self.source_command = command.to_string();
    }

    fn append_row(&mut self, row: &LogRow) {
        self.rows.push((row.line_no, row.text.clone()));
    }

    fn scroll_into_view(&mut self, row: &LogRow) {
        self.scrolled_to = Some(row.line_no);
    }

    fn show_autoscroll(&mut self, enabled: bool) {
        self.autoscroll_on_visible = enabled;
        self.autoscroll_off_visible = !enabled;
    }
}

impl<S: Surface + ?Sized> Surface for &mut S {
    fn show_status(&mut self, text: &str) {
        (**self).show_status(text);
    }

    fn hide_status(&mut self) {
        (**self).hide_status();
    }

    fn set_source_command(&mut self, command: &str) {
        (**self).set_source_command(command);
    }

    fn append_row(&mut self, row: &LogRow) {
        (**self).append_row(row);
    }

    fn scroll_into_view(&mut self, row: &LogRow) {
        (**self).scroll_into_view(row);
    }

    fn show_autoscroll(&mut self, enabled: bool) {
        (**self).show_autoscroll(enabled);
    }
}
