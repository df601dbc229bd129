//! Shared attack progress.
//!
//! One [`AttackStatus`] exists per attack run and is shared by every worker,
//! the progress reporter and the cancellation handle. The stop flag is an
//! atomic so workers can poll it between candidates; everything else lives
//! behind a single mutex.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Where the coordinator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackPhase {
    Idle,
    CrcPhase,
    CandidatePhase,
    Terminated,
}

impl fmt::Display for AttackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttackPhase::Idle => "idle",
            AttackPhase::CrcPhase => "crc",
            AttackPhase::CandidatePhase => "candidates",
            AttackPhase::Terminated => "done",
        };
        f.write_str(name)
    }
}

/// What a successful attack recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Secret {
    /// A password the oracle accepted.
    Password(String),
    /// Plaintext of a short entry recovered from its stored CRC-32.
    CrcPlaintext { entry: String, content: String },
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Password(password) => write!(f, "password: {}", password),
            Secret::CrcPlaintext { entry, content } => {
                write!(f, "content of {}: {}", entry, content)
            }
        }
    }
}

struct Progress {
    tried: u64,
    current: String,
    start: Instant,
    phase: AttackPhase,
    secret: Option<Secret>,
    cancelled: bool,
}

/// Point-in-time copy of the status for rendering.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub tried: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub current: Option<String>,
    pub phase: AttackPhase,
    pub stopped: bool,
}

pub struct AttackStatus {
    stop: AtomicBool,
    total_passwords: AtomicU64,
    inner: Mutex<Progress>,
}

impl AttackStatus {
    pub fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            total_passwords: AtomicU64::new(0),
            inner: Mutex::new(Progress {
                tried: 0,
                current: String::new(),
                start: Instant::now(),
                phase: AttackPhase::Idle,
                secret: None,
                cancelled: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        // A panicking worker must not wedge the rest of the attack.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cooperative cancellation flag; once set it stays set.
    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// The raw stop flag, for search loops that only need to poll it.
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    pub fn total_passwords(&self) -> u64 {
        self.total_passwords.load(Ordering::Relaxed)
    }

    pub fn set_total_passwords(&self, total: u64) {
        self.total_passwords.store(total, Ordering::Relaxed);
    }

    pub fn phase(&self) -> AttackPhase {
        self.lock().phase
    }

    pub fn set_phase(&self, phase: AttackPhase) {
        self.lock().phase = phase;
    }

    /// Restart the rate clock, used when the candidate phase begins.
    pub fn reset_clock(&self) {
        self.lock().start = Instant::now();
    }

    pub fn tried_passwords(&self) -> u64 {
        self.lock().tried
    }

    /// Count one verified candidate and remember it as the latest attempt.
    pub fn record_attempt(&self, candidate: &str) {
        let mut progress = self.lock();
        progress.tried += 1;
        progress.current.clear();
        progress.current.push_str(candidate);
    }

    /// Claim the single success slot.
    ///
    /// Returns `true` for exactly one caller per run: the first to arrive
    /// while the stop flag is still clear. That caller's secret is recorded
    /// and the stop flag is raised before the lock is released.
    pub fn claim_success(&self, secret: Secret) -> bool {
        let mut progress = self.lock();
        if self.stop.load(Ordering::Acquire) {
            return false;
        }
        progress.secret = Some(secret);
        self.stop.store(true, Ordering::Release);
        true
    }

    /// External cancellation request.
    pub fn cancel(&self) {
        let mut progress = self.lock();
        if !self.stop.load(Ordering::Acquire) {
            progress.cancelled = true;
            self.stop.store(true, Ordering::Release);
        }
    }

    /// Raise the stop flag without marking the run cancelled.
    pub fn finish(&self) {
        let _progress = self.lock();
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn secret(&self) -> Option<Secret> {
        self.lock().secret.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let progress = self.lock();
        StatusSnapshot {
            tried: progress.tried,
            total: self.total_passwords(),
            elapsed: progress.start.elapsed(),
            current: (!progress.current.is_empty()).then(|| progress.current.clone()),
            phase: progress.phase,
            stopped: self.should_stop(),
        }
    }
}

impl Default for AttackStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrow handle that can only observe and request cancellation.
///
/// Handed to interrupt handlers instead of the coordinator itself.
#[derive(Clone)]
pub struct StopHandle {
    status: Arc<AttackStatus>,
}

impl StopHandle {
    pub fn new(status: Arc<AttackStatus>) -> Self {
        Self { status }
    }

    pub fn cancel(&self) {
        self.status.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.status.should_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_claim_success_only_once() {
        let status = Arc::new(AttackStatus::new());
        let winners: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let status = &status;
                    s.spawn(move || status.claim_success(Secret::Password(format!("pw{i}"))))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });
        assert_eq!(winners, 1);
        assert!(status.should_stop());
        assert!(status.secret().is_some());
        assert!(!status.is_cancelled());
    }

    #[test]
    fn test_cancel_blocks_later_success() {
        let status = AttackStatus::new();
        status.cancel();
        assert!(status.should_stop());
        assert!(status.is_cancelled());
        assert!(!status.claim_success(Secret::Password("late".into())));
        assert_eq!(status.secret(), None);
    }

    #[test]
    fn test_cancel_after_success_is_not_cancellation() {
        let status = AttackStatus::new();
        assert!(status.claim_success(Secret::Password("pw".into())));
        status.cancel();
        assert!(!status.is_cancelled());
    }

    #[test]
    fn test_record_attempt_updates_snapshot() {
        let status = AttackStatus::new();
        status.set_total_passwords(10);
        status.record_attempt("first");
        status.record_attempt("second");

        let snapshot = status.snapshot();
        assert_eq!(snapshot.tried, 2);
        assert_eq!(snapshot.total, 10);
        assert_eq!(snapshot.current.as_deref(), Some("second"));
        assert!(!snapshot.stopped);
    }

    #[test]
    fn test_stop_handle_cancels() {
        let status = Arc::new(AttackStatus::new());
        let handle = StopHandle::new(status.clone());
        assert!(!handle.is_stopped());
        handle.cancel();
        assert!(handle.is_stopped());
        assert!(status.is_cancelled());
    }
}
