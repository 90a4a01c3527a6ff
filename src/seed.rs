//! Test filestore generation
//!
//! Builds a store in the standard two-hex-prefix layout
//! (`ab/ab03...40hex`) with random content, optionally planting files whose
//! name is a valid digest that does not match their content. Useful for
//! exercising the validator end to end.

use crate::hash;
use crate::output::OutputMode;
use crate::progress;
use anyhow::{Context, Result};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub root: PathBuf,
    pub count: usize,
    /// How many of `count` get a deliberately wrong name
    pub corrupt: usize,
    pub min_size: usize,
    pub max_size: usize,
}

#[derive(Debug, Default)]
pub struct SeedReport {
    pub files: usize,
    pub bytes: u64,
    /// Paths whose name does not match their content
    pub corrupted: Vec<PathBuf>,
}

/// Write one content blob under `root` using `name` as the file name.
fn write_blob(root: &Path, name: &str, content: &[u8]) -> Result<PathBuf> {
    let dir = root.join(&name[..2]);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create prefix directory {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, content)
        .with_context(|| format!("Failed to write test file {}", path.display()))?;
    Ok(path)
}

/// Generate `count` hash-named files, the first `corrupt` of them mismatched.
pub fn seed(options: &SeedOptions, mode: OutputMode) -> Result<SeedReport> {
    fs::create_dir_all(&options.root)
        .with_context(|| format!("Failed to create store root {}", options.root.display()))?;

    let bar = if mode == OutputMode::Quiet {
        None
    } else {
        Some(progress::create_progress_bar(
            options.count as u64,
            "Seeding filestore...",
        ))
    };

    let mut rng = rand::thread_rng();
    let mut report = SeedReport::default();
    let min = options.min_size.min(options.max_size).max(1);
    let max = options.max_size.max(min);

    for i in 0..options.count {
        let size = rng.gen_range(min..=max);
        let mut content = vec![0u8; size];
        rng.fill(&mut content[..]);
        let digest = hash::sha1_bytes(&content);

        let name = if i < options.corrupt {
            // A valid-looking digest that cannot match the content
            let mut bogus = [0u8; 20];
            loop {
                rng.fill(&mut bogus[..]);
                let candidate = hex::encode(bogus);
                if candidate != digest {
                    break candidate;
                }
            }
        } else {
            digest
        };

        let path = write_blob(&options.root, &name, &content)?;
        if i < options.corrupt {
            report.corrupted.push(path);
        }
        report.files += 1;
        report.bytes += size as u64;
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }

    if let Some(bar) = &bar {
        progress::finish_and_clear(bar);
    }
    Ok(report)
}
