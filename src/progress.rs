//! Live progress line for the candidate phase.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::status::{AttackStatus, StatusSnapshot};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest slice of the current candidate shown.
const CURRENT_WIDTH: usize = 20;

/// Periodically renders an [`AttackStatus`] until its stop flag is raised.
pub struct ProgressReporter<W: Write> {
    status: Arc<AttackStatus>,
    sink: W,
    interval: Duration,
}

impl<W: Write> ProgressReporter<W> {
    pub fn new(status: Arc<AttackStatus>, sink: W) -> Self {
        Self {
            status,
            sink,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Block until the attack stops, rewriting one line on every tick, then
    /// render a final line. Returns the sink.
    pub fn run(mut self) -> W {
        while !self.status.should_stop() {
            thread::sleep(self.interval);
            self.draw();
        }
        self.draw();
        // Sink errors only cost us the progress line
        let _ = writeln!(self.sink);
        let _ = self.sink.flush();
        self.sink
    }

    fn draw(&mut self) {
        let line = render(&self.status.snapshot());
        let _ = write!(self.sink, "\r{}", line);
        let _ = self.sink.flush();
    }
}

/// One progress line: `percent | ETA hh:mm:ss | rate p/s | current`.
pub fn render(snapshot: &StatusSnapshot) -> String {
    let percent = if snapshot.total > 0 {
        (snapshot.tried as f64 / snapshot.total as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    let secs = snapshot.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        (snapshot.tried as f64 / secs) as u64
    } else {
        0
    };

    let eta = match snapshot.total.checked_sub(snapshot.tried) {
        Some(left) if left > 0 && rate > 0 => format_hms(left / rate),
        _ => "N/A".to_string(),
    };

    let current: String = snapshot
        .current
        .as_deref()
        .unwrap_or("N/A")
        .chars()
        .take(CURRENT_WIDTH)
        .collect();

    format!(
        "{:6.2}% | ETA {} | {} p/s | {:<width$}",
        percent,
        eta,
        rate,
        current,
        width = CURRENT_WIDTH
    )
}

fn format_hms(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
