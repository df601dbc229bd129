//! Attack orchestration.
//!
//! A run walks `Idle → CrcPhase → CandidatePhase → Terminated`. The CRC
//! phase recovers the plaintext of tiny encrypted entries straight from
//! their checksums; the candidate phase feeds passwords from per-worker
//! generators to the archive oracle. Both phases run on dedicated OS
//! threads and poll one shared [`AttackStatus`] for cancellation.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;

use crate::collision::CollisionSearch;
use crate::config::{AttackConfig, AttackMode};
use crate::error::SetupError;
use crate::generator::{Partition, PasswordGenerator, count_dictionary, numeric_cardinality};
use crate::oracle::{ArchiveOracle, EntryInfo};
use crate::progress::ProgressReporter;
use crate::status::{AttackPhase, AttackStatus, Secret, StopHandle};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    Success(Secret),
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AttackReport {
    pub outcome: AttackOutcome,
    /// Candidates verified during the run
    pub tried: u64,
    pub elapsed: Duration,
    /// Where the archive was extracted after a password was found
    pub extracted_to: Option<PathBuf>,
}

pub struct Coordinator {
    config: AttackConfig,
    oracle: Arc<dyn ArchiveOracle>,
    status: Arc<AttackStatus>,
    show_progress: bool,
}

impl Coordinator {
    pub fn new(config: AttackConfig, oracle: Arc<dyn ArchiveOracle>) -> Self {
        Self {
            config,
            oracle,
            status: Arc::new(AttackStatus::new()),
            show_progress: false,
        }
    }

    /// Render a progress line on stderr during the candidate phase.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn status(&self) -> &Arc<AttackStatus> {
        &self.status
    }

    /// Handle for interrupt handlers.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.status.clone())
    }

    pub async fn run(&self) -> Result<AttackReport> {
        let started = Instant::now();
        let info = self.oracle.analyze().await?;

        if self.config.mode.uses_crc() && !self.status.should_stop() {
            let targets: Vec<EntryInfo> = info
                .crc_targets(self.config.crc_max_size)
                .cloned()
                .collect();
            if targets.is_empty() {
                tracing::info!(
                    "No encrypted entry of at most {} bytes, skipping CRC attack",
                    self.config.crc_max_size
                );
            } else {
                self.status.set_phase(AttackPhase::CrcPhase);
                let status = self.status.clone();
                let workers = self.config.threads;
                let secret = tokio::task::spawn_blocking(move || {
                    crc_phase(&targets, workers, status.stop_flag())
                })
                .await?;

                if let Some(secret) = secret {
                    if self.status.claim_success(secret.clone()) {
                        tracing::info!("CRC attack recovered {}", secret);
                    }
                }
            }
        }

        if self.config.mode.uses_candidates() && !self.status.should_stop() {
            if info.can_verify {
                self.candidate_phase().await?;
            } else {
                tracing::warn!("Archive has no entry a password can be verified against");
            }
        }

        self.status.finish();
        self.status.set_phase(AttackPhase::Terminated);

        let mut extracted_to = None;
        let outcome = match self.status.secret() {
            Some(secret) => {
                if let Secret::Password(password) = &secret {
                    extracted_to = self.extract_with(password).await;
                }
                AttackOutcome::Success(secret)
            }
            None if self.status.is_cancelled() => AttackOutcome::Cancelled,
            None => AttackOutcome::Exhausted,
        };

        Ok(AttackReport {
            outcome,
            tried: self.status.tried_passwords(),
            elapsed: started.elapsed(),
            extracted_to,
        })
    }

    async fn candidate_phase(&self) -> Result<()> {
        // Opening and counting the word list reads it from disk
        let config = self.config.clone();
        let (generators, total) = tokio::task::spawn_blocking(move || {
            Ok::<_, SetupError>((build_generators(&config)?, search_space(&config)?))
        })
        .await??;
        self.status.set_total_passwords(total);
        self.status.set_phase(AttackPhase::CandidatePhase);
        self.status.reset_clock();

        tracing::info!(
            "Starting {} attack with {} workers over {} candidates",
            self.config.mode,
            generators.len(),
            self.status.total_passwords()
        );

        let oracle = self.oracle.clone();
        let status = self.status.clone();
        let show_progress = self.show_progress;
        tokio::task::spawn_blocking(move || {
            run_workers(oracle.as_ref(), &status, generators, show_progress)
        })
        .await?;
        Ok(())
    }

    /// Extraction failures are reported but do not undo the success.
    async fn extract_with(&self, password: &str) -> Option<PathBuf> {
        let dir = fresh_output_dir(&self.config.output_dir);
        match self.oracle.extract(Some(password), &dir).await {
            Ok(_) => Some(dir),
            Err(e) => {
                tracing::error!("Extraction to {} failed: {:#}", dir.display(), e);
                None
            }
        }
    }
}

/// Try every CRC target in turn, stopping at the first recovered plaintext.
fn crc_phase(targets: &[EntryInfo], workers: usize, stop: &AtomicBool) -> Option<Secret> {
    let search = CollisionSearch::new().with_workers(workers).with_cancel(stop);

    for entry in targets {
        if stop.load(Ordering::Acquire) {
            return None;
        }
        tracing::info!(
            "CRC attack on {} ({} bytes, CRC 0x{:08X})",
            entry.name,
            entry.size,
            entry.crc32
        );

        match search.pattern_match(entry.crc32, entry.size as usize) {
            Ok(Some(content)) => {
                return Some(Secret::CrcPlaintext {
                    entry: entry.name.clone(),
                    content,
                });
            }
            Ok(None) => tracing::info!("No printable plaintext found for {}", entry.name),
            Err(e) => tracing::warn!("Skipping {}: {}", entry.name, e),
        }
    }
    None
}

/// One generator per worker, so no generator is ever shared.
///
/// Hybrid mode gives half the workers to the dictionary and the rest to the
/// numeric range, each source split across its workers by [`Partition`].
/// With a single thread that one worker reads the dictionary and then walks
/// the numeric range. Never more generators than `config.threads`.
pub fn build_generators(config: &AttackConfig) -> Result<Vec<PasswordGenerator>, SetupError> {
    let dictionary = |count: usize| {
        (0..count)
            .map(|i| PasswordGenerator::dictionary(&config.dictionary, Partition::new(i, count)))
            .collect::<Result<Vec<_>, _>>()
    };
    let numeric = |count: usize| {
        (0..count)
            .map(|i| {
                PasswordGenerator::numeric(
                    config.min_length,
                    config.max_length,
                    Partition::new(i, count),
                )
            })
            .collect::<Result<Vec<_>, _>>()
    };

    let threads = config.threads;
    match config.mode {
        AttackMode::Dictionary => dictionary(threads),
        AttackMode::Bruteforce => numeric(threads),
        AttackMode::Hybrid if threads <= 1 => {
            let mut sources = dictionary(1)?;
            sources.extend(numeric(1)?);
            Ok(vec![PasswordGenerator::chain(sources)])
        }
        AttackMode::Hybrid => {
            let dictionary_workers = threads / 2;
            let numeric_workers = threads - dictionary_workers;
            let mut generators = dictionary(dictionary_workers)?;
            generators.extend(numeric(numeric_workers)?);
            Ok(generators)
        }
        AttackMode::Crc => Ok(Vec::new()),
    }
}

/// Total number of candidates the configured generators yield.
pub fn search_space(config: &AttackConfig) -> Result<u64, SetupError> {
    let mut total = 0u64;
    if config.mode.uses_dictionary() {
        total = total.saturating_add(count_dictionary(&config.dictionary)?);
    }
    if config.mode.uses_numeric() {
        total = total.saturating_add(numeric_cardinality(config.min_length, config.max_length));
    }
    Ok(total)
}

fn run_workers(
    oracle: &dyn ArchiveOracle,
    status: &Arc<AttackStatus>,
    generators: Vec<PasswordGenerator>,
    show_progress: bool,
) {
    thread::scope(|s| {
        let progress = show_progress.then(|| {
            let reporter = ProgressReporter::new(status.clone(), io::stderr());
            thread::Builder::new()
                .name("progress".into())
                .spawn_scoped(s, move || {
                    reporter.run();
                })
        });

        let workers: Vec<_> = generators
            .into_iter()
            .enumerate()
            .filter_map(|(index, generator)| {
                let spawned = thread::Builder::new()
                    .name(format!("worker-{}", index))
                    .spawn_scoped(s, move || work(oracle, status, generator));
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::error!("Failed to spawn worker {}: {}", index, e);
                        None
                    }
                }
            })
            .collect();

        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("A worker panicked");
            }
        }

        // Exhausted or not, nothing is left to try
        status.finish();

        if let Some(Err(e)) = progress {
            tracing::warn!("Progress display unavailable: {}", e);
        }
    });
}

fn work(oracle: &dyn ArchiveOracle, status: &AttackStatus, mut generator: PasswordGenerator) {
    tracing::trace!("{} worker started", generator.kind());
    while !status.should_stop() {
        let Some(candidate) = generator.next() else {
            break;
        };
        status.record_attempt(&candidate);

        if oracle.try_password(&candidate) {
            if status.claim_success(Secret::Password(candidate.clone())) {
                tracing::info!("Password found: {}", candidate);
            }
            return;
        }
    }
}

/// `<base>/extracted_<unix seconds>`, with a numeric suffix if that exists.
pub fn fresh_output_dir(base: &Path) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let stem = format!("extracted_{}", secs);

    let mut dir = base.join(&stem);
    let mut n = 1;
    while dir.exists() {
        dir = base.join(format!("{}_{}", stem, n));
        n += 1;
    }
    dir
}
