mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use common::write_word_list;
use tempfile::TempDir;
use zipcrack::{
    ArchiveInfo, ArchiveKind, ArchiveOracle, AttackConfig, AttackMode, AttackOutcome,
    Coordinator, EntryInfo, Secret, SetupError,
};
use zipcrack::progress::POLL_INTERVAL;
use zipcrack::status::AttackPhase;

/// Oracle that accepts one fixed password.
struct MockOracle {
    password: String,
    entries: Vec<EntryInfo>,
    checks: AtomicU64,
    extractions: AtomicUsize,
}

impl MockOracle {
    fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            entries: Vec::new(),
            checks: AtomicU64::new(0),
            extractions: AtomicUsize::new(0),
        }
    }

    fn with_entry(mut self, name: &str, content: &[u8]) -> Self {
        self.entries.push(EntryInfo {
            name: name.to_string(),
            crc32: zipcrack::crc32::crc32(content),
            size: content.len() as u64,
            compressed_size: content.len() as u64 + 12,
            encrypted: true,
            is_directory: false,
        });
        self
    }
}

#[async_trait]
impl ArchiveOracle for MockOracle {
    async fn analyze(&self) -> Result<ArchiveInfo> {
        Ok(ArchiveInfo {
            kind: ArchiveKind::Zip,
            is_encrypted: true,
            file_count: self.entries.len(),
            total_size: self.entries.iter().map(|e| e.size).sum(),
            entries: self.entries.clone(),
            has_fake_encryption: false,
            can_verify: true,
        })
    }

    fn try_password(&self, candidate: &str) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);
        candidate == self.password
    }

    async fn extract(&self, password: Option<&str>, output_dir: &Path) -> Result<usize> {
        assert_eq!(password, Some(self.password.as_str()));
        self.extractions.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(output_dir)?;
        Ok(0)
    }

    async fn repair_fake_encryption(&self, _output_path: &Path) -> Result<usize> {
        Ok(0)
    }
}

fn config(dir: &TempDir, mode: AttackMode, threads: usize) -> AttackConfig {
    let mut config = AttackConfig::new("mock.zip");
    config.mode = mode;
    config.threads = threads;
    config.output_dir = dir.path().join("out");
    config
}

#[tokio::test]
async fn test_dictionary_success_is_claimed_once() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, AttackMode::Dictionary, 8);
    config.dictionary = write_word_list(dir.path(), 1000, Some(("hunter2", 7)));

    let oracle = Arc::new(MockOracle::new("hunter2"));
    let coordinator = Coordinator::new(config, oracle.clone());
    let report = coordinator.run().await.unwrap();

    assert_eq!(
        report.outcome,
        AttackOutcome::Success(Secret::Password("hunter2".into()))
    );
    assert!(report.tried <= 1000);
    assert!(report.tried >= 1);
    assert_eq!(report.tried, oracle.checks.load(Ordering::Relaxed));
    assert_eq!(oracle.extractions.load(Ordering::SeqCst), 1);
    assert!(coordinator.status().should_stop());
    assert_eq!(coordinator.status().phase(), AttackPhase::Terminated);

    let extracted = report.extracted_to.unwrap();
    assert!(extracted.starts_with(dir.path().join("out")));
    assert!(extracted.is_dir());
}

#[tokio::test]
async fn test_dictionary_exhaustion() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, AttackMode::Dictionary, 3);
    config.dictionary = write_word_list(dir.path(), 50, None);

    let oracle = Arc::new(MockOracle::new("not-in-list"));
    let report = Coordinator::new(config, oracle.clone()).run().await.unwrap();

    assert_eq!(report.outcome, AttackOutcome::Exhausted);
    assert_eq!(report.tried, 50);
    assert_eq!(oracle.extractions.load(Ordering::SeqCst), 0);
    assert!(report.extracted_to.is_none());
}

#[tokio::test]
async fn test_bruteforce_exhausts_exact_space() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, AttackMode::Bruteforce, 4);
    config.min_length = 1;
    config.max_length = 3;

    let oracle = Arc::new(MockOracle::new("abc"));
    let report = Coordinator::new(config, oracle).run().await.unwrap();

    assert_eq!(report.outcome, AttackOutcome::Exhausted);
    assert_eq!(report.tried, 10 + 100 + 1000);
}

#[tokio::test]
async fn test_hybrid_finds_numeric_password() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, AttackMode::Hybrid, 4);
    config.dictionary = write_word_list(dir.path(), 20, None);
    config.min_length = 1;
    config.max_length = 4;

    let oracle = Arc::new(MockOracle::new("0042"));
    let report = Coordinator::new(config, oracle.clone()).run().await.unwrap();

    assert_eq!(
        report.outcome,
        AttackOutcome::Success(Secret::Password("0042".into()))
    );
    assert_eq!(oracle.extractions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_crc_phase_skips_candidates() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, AttackMode::Hybrid, 2);
    config.dictionary = write_word_list(dir.path(), 10, None);

    let oracle = Arc::new(MockOracle::new("unused").with_entry("key.txt", b"x9"));
    let report = Coordinator::new(config, oracle.clone()).run().await.unwrap();

    assert_eq!(
        report.outcome,
        AttackOutcome::Success(Secret::CrcPlaintext {
            entry: "key.txt".into(),
            content: "x9".into(),
        })
    );
    assert_eq!(report.tried, 0);
    assert_eq!(oracle.checks.load(Ordering::Relaxed), 0);
    assert_eq!(oracle.extractions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_stops_workers_promptly() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, AttackMode::Bruteforce, 4);
    config.min_length = 1;
    config.max_length = 8;

    let oracle = Arc::new(MockOracle::new("not-a-number"));
    let coordinator = Arc::new(Coordinator::new(config, oracle.clone()));
    let stop = coordinator.stop_handle();

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run().await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    let before = coordinator.status().tried_passwords();
    let cancelled_at = Instant::now();
    stop.cancel();
    assert!(stop.is_stopped());

    let report = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("workers did not stop")
        .unwrap()
        .unwrap();
    let latency = cancelled_at.elapsed();
    assert!(
        latency < POLL_INTERVAL * 3,
        "run took {:?} to return after cancel",
        latency
    );

    assert_eq!(report.outcome, AttackOutcome::Cancelled);
    assert!(report.tried >= before);
    assert!(report.tried < 111_111_110);
    assert_eq!(oracle.extractions.load(Ordering::SeqCst), 0);

    // Nothing keeps counting once the run has returned
    let settled = coordinator.status().tried_passwords();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(coordinator.status().tried_passwords(), settled);
    assert_eq!(settled, report.tried);
}

#[tokio::test]
async fn test_word_list_removed_after_validation_fails_run() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, AttackMode::Dictionary, 2);
    config.dictionary = write_word_list(dir.path(), 10, None);
    std::fs::remove_file(&config.dictionary).unwrap();

    let oracle = Arc::new(MockOracle::new("anything"));
    let err = Coordinator::new(config, oracle.clone())
        .run()
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<SetupError>(),
        Some(SetupError::Dictionary { .. })
    ));
    assert_eq!(oracle.checks.load(Ordering::Relaxed), 0);
}
