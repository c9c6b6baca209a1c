/// One rendered line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    /// 1-based gutter number.
    pub line_no: u64,
    /// Payload exactly as received.
    pub text: String,
}

/// Append-only list of rows. Numbering starts at 1 and is never reset.
#[derive(Debug, Clone, Default)]
pub struct LogView {
    rows: Vec<LogRow>,
}

impl LogView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` under the next line number.
    pub fn push(&mut self, text: impl Into<String>) -> &LogRow {
        let line_no = self.next_line_no();
        self.rows.push(LogRow {
            line_no,
            text: text.into(),
        });
        &self.rows[self.rows.len() - 1]
    }

    #[must_use]
    pub fn next_line_no(&self) -> u64 {
        self.rows.len() as u64 + 1
    }

    #[must_use]
    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&LogRow> {
        self.rows.last()
    }
}
