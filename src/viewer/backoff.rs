use std::time::Duration;

/// Delay before the first open-state check, and the increment after each miss.
pub const CONNECT_STEP: Duration = Duration::from_millis(500);

/// Delays between checks for an open connection: 500ms, 1000ms, 1500ms, ...
///
/// Never ends and never caps; the subscribe handshake waits as long as it takes.
#[derive(Debug, Clone)]
pub struct SubscribeBackoff {
    step: Duration,
    current: Option<Duration>,
}

impl SubscribeBackoff {
    #[must_use]
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            current: None,
        }
    }

    /// The most recently yielded delay.
    #[must_use]
    pub fn current(&self) -> Option<Duration> {
        self.current
    }
}

impl Default for SubscribeBackoff {
    fn default() -> Self {
        Self::new(CONNECT_STEP)
    }
}

impl Iterator for SubscribeBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let next = match self.current {
            None => self.step,
            Some(previous) => previous.saturating_add(self.step),
        };
        self.current = Some(next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_growth() {
        let delays: Vec<u128> = SubscribeBackoff::default()
            .take(4)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![500, 1000, 1500, 2000]);
    }

    #[test]
    fn test_each_interval_is_previous_plus_step() {
        let delays: Vec<Duration> = SubscribeBackoff::new(Duration::from_millis(10))
            .take(50)
            .collect();
        for pair in delays.windows(2) {
            assert_eq!(pair[1], pair[0] + Duration::from_millis(10));
        }
    }
}
