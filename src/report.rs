//! Run-level tallying and report rendering
//!
//! The reporter never assumes a fixed total: candidates stream in and the
//! grand total is unknown until the scan finishes. Corruption findings
//! (`fail`) and unverifiable files (`error`) are kept structurally separate
//! in the final report, because a fail means the content is wrong while an
//! error only means we could not check it.

use crate::output::OutputMode;
use crate::pool::BatchOutcome;
use crate::progress;
use crate::record::{Totals, VerificationResult, Verdict, Window};
use colored::*;
use indicatif::ProgressBar;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Everything known about a finished (or interrupted) run.
#[derive(Debug)]
pub struct RunSummary {
    pub root: PathBuf,
    pub window: Window,
    pub totals: Totals,
    pub files: u64,
    pub bytes_verified: u64,
    pub batches_completed: u64,
    pub anomalies: Vec<VerificationResult>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &VerificationResult> {
        self.anomalies
            .iter()
            .filter(|a| matches!(a.verdict, Verdict::Fail { .. }))
    }

    pub fn errors(&self) -> impl Iterator<Item = &VerificationResult> {
        self.anomalies
            .iter()
            .filter(|a| matches!(a.verdict, Verdict::Error { .. }))
    }

    /// Plain-text rendering, used for the on-disk report file.
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Filestore verification report");
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Root:    {}", self.root.display());
        let _ = writeln!(out, "Window:  {}", self.window);
        if self.interrupted {
            let _ = writeln!(out, "Status:  INTERRUPTED (resume with the same command)");
        }
        let _ = writeln!(
            out,
            "Files:   {} in {} batches ({} verified)",
            self.files,
            self.batches_completed,
            bytesize::to_string(self.bytes_verified, true)
        );
        let _ = writeln!(out, "Pass:    {}", self.totals.pass);
        let _ = writeln!(out, "Fail:    {}", self.totals.fail);
        let _ = writeln!(out, "Error:   {}", self.totals.error);

        if self.totals.fail > 0 {
            let _ = writeln!(out);
            let _ = writeln!(out, "FAILED (content does not match name):");
            let _ = writeln!(out, "{}", "-".repeat(40));
            for anomaly in self.failures() {
                if let Verdict::Fail { actual_hash } = &anomaly.verdict {
                    let _ = writeln!(out, "{}", anomaly.record.path.display());
                    let _ = writeln!(out, "  expected {}", anomaly.record.expected_hash);
                    let _ = writeln!(out, "  actual   {actual_hash}");
                }
            }
        }

        if self.totals.error > 0 {
            let _ = writeln!(out);
            let _ = writeln!(out, "ERRORS (could not verify):");
            let _ = writeln!(out, "{}", "-".repeat(40));
            for anomaly in self.errors() {
                if let Verdict::Error { reason } = &anomaly.verdict {
                    let _ = writeln!(out, "{}: {reason}", anomaly.record.path.display());
                }
            }
        }
        out
    }

    /// Colored summary for the console.
    pub fn print_human(&self, mode: OutputMode) {
        if mode == OutputMode::Quiet {
            return;
        }

        println!();
        println!("{}", "Filestore verification".bold());
        println!("{}", "-".repeat(60));
        println!("Root:    {}", self.root.display());
        println!("Window:  {}", self.window);
        if self.interrupted {
            println!(
                "Status:  {}",
                "interrupted - resume with the same command".yellow()
            );
        }
        println!(
            "Files:   {} in {} batches ({} verified)",
            self.files,
            self.batches_completed,
            bytesize::to_string(self.bytes_verified, true)
        );
        println!("Pass:    {}", self.totals.pass.to_string().green());
        println!("Fail:    {}", colorize_count(self.totals.fail, Color::Red));
        println!(
            "Error:   {}",
            colorize_count(self.totals.error, Color::Yellow)
        );

        if self.totals.fail > 0 {
            println!();
            println!("{}", "FAILED (content does not match name):".red().bold());
            for anomaly in self.failures() {
                if let Verdict::Fail { actual_hash } = &anomaly.verdict {
                    println!("  {}", anomaly.record.path.display());
                    println!("    expected {}", anomaly.record.expected_hash);
                    println!("    actual   {actual_hash}");
                }
            }
        }

        if self.totals.error > 0 {
            println!();
            println!("{}", "ERRORS (could not verify):".yellow().bold());
            for anomaly in self.errors() {
                if let Verdict::Error { reason } = &anomaly.verdict {
                    println!("  {}: {reason}", anomaly.record.path.display());
                }
            }
        }

        println!();
        if self.totals.is_clean() && !self.interrupted {
            println!("{}", "Store is clean.".green());
        } else if !self.totals.is_clean() {
            println!(
                "{}",
                format!(
                    "{} finding(s): {} corrupt, {} unverifiable",
                    self.totals.fail + self.totals.error,
                    self.totals.fail,
                    self.totals.error
                )
                .red()
            );
        }
    }
}

fn colorize_count(count: u64, color: Color) -> ColoredString {
    let text = count.to_string();
    if count > 0 {
        text.color(color).bold()
    } else {
        text.normal()
    }
}

/// Accumulates batch outcomes and emits incremental progress.
pub struct Reporter {
    mode: OutputMode,
    totals: Totals,
    anomalies: Vec<VerificationResult>,
    files: u64,
    bytes: u64,
    batches: u64,
    spinner: Option<ProgressBar>,
}

impl Reporter {
    pub fn new(mode: OutputMode) -> Self {
        let spinner = if mode == OutputMode::Normal {
            Some(progress::create_spinner("Scanning filestore..."))
        } else {
            None
        };
        Self {
            mode,
            totals: Totals::default(),
            anomalies: Vec::new(),
            files: 0,
            bytes: 0,
            batches: 0,
            spinner,
        }
    }

    /// Fold one completed batch into the running tally and emit a progress
    /// line for it.
    pub fn record_batch(&mut self, outcome: BatchOutcome) {
        self.totals.merge(&outcome.totals);
        self.files += outcome.records as u64;
        self.bytes += outcome.bytes;
        self.batches += 1;

        let line = format!(
            "batch {} | {} files | pass {} fail {} error {} | {}",
            outcome.sequence_number,
            self.files,
            self.totals.pass,
            self.totals.fail,
            self.totals.error,
            bytesize::to_string(self.bytes, true)
        );
        match self.mode {
            OutputMode::Quiet => {}
            OutputMode::Normal => {
                if let Some(spinner) = &self.spinner {
                    spinner.set_message(line);
                }
            }
            OutputMode::Verbose => {
                println!("{line}");
                for anomaly in &outcome.anomalies {
                    match &anomaly.verdict {
                        Verdict::Fail { actual_hash } => eprintln!(
                            "{} {} expected {} actual {}",
                            "FAIL".red().bold(),
                            anomaly.record.path.display(),
                            anomaly.record.expected_hash,
                            actual_hash
                        ),
                        Verdict::Error { reason } => eprintln!(
                            "{} {}: {}",
                            "ERROR".yellow().bold(),
                            anomaly.record.path.display(),
                            reason
                        ),
                        Verdict::Pass => {}
                    }
                }
            }
        }

        self.anomalies.extend(outcome.anomalies);
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn finish(self, root: PathBuf, window: Window, interrupted: bool) -> RunSummary {
        if let Some(spinner) = &self.spinner {
            progress::finish_and_clear(spinner);
        }
        RunSummary {
            root,
            window,
            totals: self.totals,
            files: self.files,
            bytes_verified: self.bytes,
            batches_completed: self.batches,
            anomalies: self.anomalies,
            interrupted,
        }
    }
}
