//! Command-line entry point for zipcrack.
//!
//! Exit codes: 0 when a secret was recovered or the archive needed no
//! password, 1 on setup errors, 2 when every candidate failed and 130 when
//! interrupted.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use zipcrack::{
    ArchiveInfo, AttackConfig, AttackOutcome, Cli, Coordinator, Secret, io, open_target,
};

const EXIT_SETUP: u8 = 1;
const EXIT_EXHAUSTED: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::from(EXIT_SETUP)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    setup_logging(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_SETUP)
        }
    }
}

fn setup_logging(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let show_progress = !cli.is_quiet();
    let config = cli.into_config()?;

    let oracle = open_target(&config.target).await?;
    let info = oracle.analyze().await?;
    print_summary(&config, &info);

    if !info.is_encrypted {
        let written = oracle.extract(None, &config.output_dir).await?;
        println!(
            "[+] Archive is not encrypted, extracted {} files to {}",
            written,
            config.output_dir.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    if info.has_fake_encryption {
        let repaired_path = repaired_path(&config);
        let repaired = oracle.repair_fake_encryption(&repaired_path).await?;
        println!(
            "[+] Fake encryption removed from {} entries: {}",
            repaired,
            repaired_path.display()
        );

        if !info.entries.iter().any(|e| e.encrypted) {
            let written = oracle.extract(None, &config.output_dir).await?;
            println!(
                "[+] Extracted {} files to {}",
                written,
                config.output_dir.display()
            );
            return Ok(ExitCode::SUCCESS);
        }
        tracing::warn!("Some entries are genuinely encrypted, continuing the attack");
    }

    let coordinator = Coordinator::new(config, oracle).with_progress(show_progress);
    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping workers");
            stop.cancel();
        }
    });

    let report = coordinator.run().await?;
    let rate = report.tried as f64 / report.elapsed.as_secs_f64().max(0.001);
    tracing::info!(
        "Tried {} candidates in {:.1}s ({:.0} p/s)",
        report.tried,
        report.elapsed.as_secs_f64(),
        rate
    );

    let code = match report.outcome {
        AttackOutcome::Success(secret) => {
            match &secret {
                Secret::Password(password) => println!("[+] Password found: {}", password),
                Secret::CrcPlaintext { entry, content } => {
                    println!("[+] Content of {} recovered from its CRC: {}", entry, content)
                }
            }
            if let Some(dir) = report.extracted_to {
                println!("[+] Files extracted to {}", dir.display());
            }
            ExitCode::SUCCESS
        }
        AttackOutcome::Exhausted => {
            println!("[-] No password found");
            ExitCode::from(EXIT_EXHAUSTED)
        }
        AttackOutcome::Cancelled => {
            println!("[-] Attack cancelled after {} candidates", report.tried);
            ExitCode::from(EXIT_CANCELLED)
        }
    };
    Ok(code)
}

fn print_summary(config: &AttackConfig, info: &ArchiveInfo) {
    tracing::info!(
        "{} archive: {} files, {} uncompressed, encrypted: {}",
        info.kind,
        info.file_count,
        format_size(info.total_size),
        info.is_encrypted
    );
    for entry in info.entries.iter().filter(|e| !e.is_directory) {
        tracing::debug!(
            "  {} ({} bytes, CRC 0x{:08X}{})",
            entry.name,
            entry.size,
            entry.crc32,
            if entry.encrypted { ", encrypted" } else { "" }
        );
    }
    tracing::info!("Mode {}, {} threads", config.mode, config.threads);
}

/// `fixed_<name>` next to a local archive, or in the output directory for
/// a remote one.
fn repaired_path(config: &AttackConfig) -> PathBuf {
    let source = config
        .target
        .split(['?', '#'])
        .next()
        .unwrap_or(&config.target);
    let name = Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive.zip".to_string());
    let fixed = format!("fixed_{}", name);

    if io::is_http_url(&config.target) {
        config.output_dir.join(fixed)
    } else {
        Path::new(source).with_file_name(fixed)
    }
}

/// Format a byte count with binary units.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
