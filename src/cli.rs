use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::errors::CheckpointError;
use crate::output::{self, OutputMode};
use crate::pool::DEFAULT_WORKERS;
use crate::record::Window;
use crate::report::RunSummary;
use crate::seed::{self, SeedOptions};
use crate::verifier::{self, VerifyOptions};

/// Accepted format for `--start-time` / `--end-time`
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Default name of the plain-text report, next to the checkpoint
const REPORT_FILE: &str = "validation-report.txt";

#[derive(Parser)]
#[command(name = "checkstore")]
#[command(version)]
#[command(about = "Verify a content-addressed filestore against its file names")]
#[command(long_about = "Checkstore validates a filestore in which every file is named by the \
    SHA-1 digest of its own content. It streams the tree, recomputes digests in \
    parallel, and checkpoints progress after every batch so an interrupted run \
    resumes where it left off.\n\n\
    Examples:\n  \
    checkstore verify /data/filestore              # verify what changed since last run\n  \
    checkstore verify /data/filestore --full       # ignore the window, verify everything\n  \
    checkstore verify /data/filestore -t 8 --batch-size 500\n  \
    checkstore verify /data/filestore --start-time \"2024-01-01 00:00\" --end-time \"2024-02-01 00:00\"\n  \
    checkstore status                              # show checkpoint progress\n  \
    checkstore seed /tmp/store --count 1000 --corrupt 3")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify file content digests against their names
    #[command(visible_alias = "v")]
    Verify {
        /// Filestore root directory
        root: PathBuf,

        /// Start of the modification-time window, inclusive (YYYY-MM-DD HH:MM, UTC)
        #[arg(long, value_name = "TIME", requires = "end_time")]
        start_time: Option<String>,

        /// End of the modification-time window, exclusive (YYYY-MM-DD HH:MM, UTC)
        #[arg(long, value_name = "TIME", requires = "start_time")]
        end_time: Option<String>,

        /// Ignore the checkpoint window and verify the full history
        #[arg(long, conflicts_with_all = ["start_time", "end_time"])]
        full: bool,

        /// Files per batch
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,

        /// Worker thread count
        #[arg(short = 't', long, value_name = "N")]
        threads: Option<usize>,

        /// Checkpoint file location
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,

        /// Where to write the plain-text report
        #[arg(long, value_name = "PATH", conflicts_with = "no_report")]
        report: Option<PathBuf>,

        /// Skip writing the plain-text report file
        #[arg(long)]
        no_report: bool,

        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Show checkpoint progress without scanning
    Status {
        /// Checkpoint file location
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,
    },

    /// Delete the checkpoint so the next run starts from scratch
    Reset {
        /// Checkpoint file location
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Generate a test filestore of hash-named files
    Seed {
        /// Directory to create the store in
        root: PathBuf,

        /// Number of files to generate
        #[arg(long, default_value_t = 100)]
        count: usize,

        /// How many files get a deliberately mismatched name
        #[arg(long, default_value_t = 0)]
        corrupt: usize,

        /// Minimum file size in bytes
        #[arg(long, default_value_t = 100)]
        min_size: usize,

        /// Maximum file size in bytes
        #[arg(long, default_value_t = 4096)]
        max_size: usize,
    },
}

/// Set by the SIGINT handler; the producer stops and in-flight batches
/// finish, so the checkpoint stays contiguous.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn handle_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_interrupt_handler() {
    // Safety: the handler only stores to an atomic, which is async-signal-safe
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_interrupt_handler() {}

fn parse_time(value: &str, flag: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .with_context(|| format!("{flag} must look like \"YYYY-MM-DD HH:MM\", got {value:?}"))?;
    Ok(naive.and_utc())
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let mode = OutputMode::from_flags(self.verbose, self.quiet);

        match self.command {
            Commands::Verify {
                root,
                start_time,
                end_time,
                full,
                batch_size,
                threads,
                checkpoint,
                report,
                no_report,
                json,
            } => {
                let config = Config::load()?;

                let window_override = if full {
                    Some(Window::full_range(Utc::now()))
                } else {
                    match (start_time, end_time) {
                        (Some(start), Some(end)) => {
                            let start = parse_time(&start, "--start-time")?;
                            let end = parse_time(&end, "--end-time")?;
                            if start >= end {
                                bail!("--start-time must be before --end-time");
                            }
                            Some(Window::new(start, end))
                        }
                        _ => None,
                    }
                };

                let checkpoint_path = checkpoint
                    .or(config.checkpoint)
                    .unwrap_or_else(CheckpointStore::default_path);
                let report_path = if no_report {
                    None
                } else {
                    Some(report.or(config.report).unwrap_or_else(|| {
                        checkpoint_path
                            .parent()
                            .map(|dir| dir.join(REPORT_FILE))
                            .unwrap_or_else(|| PathBuf::from(REPORT_FILE))
                    }))
                };

                let options = VerifyOptions {
                    root,
                    window_override,
                    batch_size: batch_size
                        .or(config.batch_size)
                        .unwrap_or(DEFAULT_BATCH_SIZE),
                    workers: threads.or(config.threads).unwrap_or(DEFAULT_WORKERS),
                    checkpoint_path,
                    report_path,
                    mode,
                };

                install_interrupt_handler();
                let summary = verifier::run(&options, &INTERRUPTED)?;

                if json {
                    output::print_json(&summary)?;
                } else {
                    summary.print_human(mode);
                }
                print_findings_note(&summary, mode);
                Ok(())
            }

            Commands::Status { checkpoint } => {
                let store = CheckpointStore::new(
                    checkpoint.unwrap_or_else(CheckpointStore::default_path),
                );
                match store.load()? {
                    None => {
                        println!("No checkpoint at {}", store.path().display());
                    }
                    Some(state) => {
                        print!("{}", render_status(&state, store.path()));
                    }
                }
                Ok(())
            }

            Commands::Reset { checkpoint, yes } => {
                let store = CheckpointStore::new(
                    checkpoint.unwrap_or_else(CheckpointStore::default_path),
                );
                // Reset is the recovery path for a checkpoint that no longer
                // parses, so an unreadable state must not stop the deletion
                match store.load() {
                    Ok(None) => {
                        println!("No checkpoint at {}", store.path().display());
                        return Ok(());
                    }
                    Ok(Some(_)) => {}
                    Err(err @ (CheckpointError::Corrupt { .. } | CheckpointError::Version { .. })) => {
                        eprintln!("{} {err}; deleting it", "Warning:".yellow());
                    }
                    Err(err) => return Err(err.into()),
                }
                if !yes && !confirm(&format!("Delete checkpoint {}?", store.path().display()))? {
                    println!("Aborted.");
                    return Ok(());
                }
                store.remove()?;
                println!("Checkpoint removed; the next run verifies the full history.");
                Ok(())
            }

            Commands::Seed {
                root,
                count,
                corrupt,
                min_size,
                max_size,
            } => {
                if corrupt > count {
                    bail!("--corrupt cannot exceed --count");
                }
                let report = seed::seed(
                    &SeedOptions {
                        root: root.clone(),
                        count,
                        corrupt,
                        min_size,
                        max_size,
                    },
                    mode,
                )?;
                if mode != OutputMode::Quiet {
                    println!(
                        "Seeded {} files ({}) under {}",
                        report.files,
                        bytesize::to_string(report.bytes, true),
                        root.display()
                    );
                    for path in &report.corrupted {
                        println!("  {} {}", "corrupt:".red(), path.display());
                    }
                }
                Ok(())
            }
        }
    }
}

fn render_status(state: &crate::checkpoint::CheckpointState, path: &std::path::Path) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "Checkpoint: {}", path.display());
    let _ = writeln!(out, "Window:     {}", state.window);
    let _ = writeln!(
        out,
        "State:      {}",
        if state.window_complete {
            "complete".green()
        } else {
            "interrupted - next run resumes it".yellow()
        }
    );
    let _ = writeln!(out, "Batches:    {} completed", state.last_completed_sequence);
    let _ = writeln!(
        out,
        "Totals:     pass {} fail {} error {}",
        state.totals.pass, state.totals.fail, state.totals.error
    );
    let _ = writeln!(
        out,
        "Updated:    {}",
        state.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    out
}

fn print_findings_note(summary: &RunSummary, mode: OutputMode) {
    // Findings are reported, not treated as process failure; still make them
    // impossible to miss in quiet mode
    if mode == OutputMode::Quiet && !summary.totals.is_clean() {
        eprintln!(
            "{} {} corrupt, {} unverifiable",
            "findings:".red().bold(),
            summary.totals.fail,
            summary.totals.error
        );
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_verify_with_window() {
        let cli = Cli::parse_from([
            "checkstore",
            "verify",
            "/data/filestore",
            "--start-time",
            "2024-01-01 00:00",
            "--end-time",
            "2024-02-01 00:00",
            "-t",
            "8",
        ]);
        match cli.command {
            Commands::Verify {
                root,
                start_time,
                end_time,
                threads,
                ..
            } => {
                assert_eq!(root, PathBuf::from("/data/filestore"));
                assert_eq!(start_time.as_deref(), Some("2024-01-01 00:00"));
                assert_eq!(end_time.as_deref(), Some("2024-02-01 00:00"));
                assert_eq!(threads, Some(8));
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn start_time_requires_end_time() {
        let result = Cli::try_parse_from([
            "checkstore",
            "verify",
            "/data/filestore",
            "--start-time",
            "2024-01-01 00:00",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn status_labels_window_bounds_and_state_separately() {
        use crate::checkpoint::CheckpointState;

        let mut state = CheckpointState::initial(Utc::now());
        state.window_complete = false;
        let text = render_status(&state, std::path::Path::new(".checkstore/checkpoint.json"));

        assert_eq!(text.matches("Window:").count(), 1);
        assert_eq!(text.matches("State:").count(), 1);
        assert!(text.contains("interrupted"));
    }

    #[test]
    fn reset_deletes_an_unparseable_checkpoint() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let cli = Cli {
            command: Commands::Reset {
                checkpoint: Some(path.clone()),
                yes: true,
            },
            verbose: 0,
            quiet: true,
        };
        cli.run().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn parse_time_accepts_documented_format() {
        let parsed = parse_time("2024-03-05 17:45", "--start-time").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T17:45:00+00:00");
        assert!(parse_time("yesterday", "--start-time").is_err());
    }
}
