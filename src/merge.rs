//! Combining per-run result files into one data file per series.
//!
//! `ms-t12-c1000.txt`, `ms-t12-c2000.txt`, ... become `ms-t12-all.txt`, one
//! line per run, each prefixed with its work value. The thread axis works the
//! same way with `-t<n>` and `-threads.txt`.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, IoContext, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesAxis {
    Work,
    Threads,
}

impl SeriesAxis {
    /// Suffix of the combined files, without `.txt`.
    pub fn suffix(self) -> &'static str {
        match self {
            SeriesAxis::Work => "-all",
            SeriesAxis::Threads => "-threads",
        }
    }

    /// Split a result file name into its series key and axis value.
    ///
    /// The last matching token wins, so `my-crq-c8-c1000.txt` is series
    /// `my-crq-c8` at work 1000.
    pub fn parse(self, file_name: &str) -> Option<(String, u64)> {
        let stem = file_name.strip_suffix(".txt").unwrap_or(file_name);
        if stem.ends_with(SeriesAxis::Work.suffix()) || stem.ends_with(SeriesAxis::Threads.suffix()) {
            return None;
        }
        match self {
            SeriesAxis::Work => {
                let (key, value) = stem.rsplit_once("-c")?;
                if key.is_empty() || !is_digits(value) {
                    return None;
                }
                Some((key.to_string(), value.parse().ok()?))
            }
            SeriesAxis::Threads => {
                let parts: Vec<&str> = stem.split('-').collect();
                let idx = (1..parts.len())
                    .rev()
                    .find(|&i| parts[i].starts_with('t') && is_digits(&parts[i][1..]))?;
                let value = parts[idx][1..].parse().ok()?;
                let key: Vec<&str> = parts
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != idx)
                    .map(|(_, p)| *p)
                    .collect();
                Some((key.join("-"), value))
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub written: Vec<PathBuf>,
    /// Series that could not be combined, by key.
    pub failed: Vec<(String, Error)>,
}

fn combine(directory: &Path, runs: &[(u64, String)]) -> Result<Vec<u8>> {
    let mut combined = Vec::new();
    for (value, name) in runs {
        let path = directory.join(name);
        let data = fs::read(&path).at(&path)?;
        let end = data
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map_or(0, |i| i + 1);
        combined.extend_from_slice(value.to_string().as_bytes());
        combined.push(b' ');
        combined.extend_from_slice(&data[..end]);
        combined.push(b'\n');
    }
    Ok(combined)
}

/// Merge every series found in `directory`.
///
/// Files whose names do not fit the axis are ignored. Existing combined
/// files are overwritten. A series that cannot be read or written is logged
/// and reported; the others are still merged.
pub fn merge_series(directory: &Path, axis: SeriesAxis) -> Result<MergeReport> {
    if !directory.is_dir() {
        return Err(Error::NotADirectory(directory.to_path_buf()));
    }

    let mut series: BTreeMap<String, Vec<(u64, String)>> = BTreeMap::new();
    for entry in fs::read_dir(directory).at(directory)? {
        let entry = entry.at(directory)?;
        if !entry.path().is_file() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if let Some((key, value)) = axis.parse(&name) {
            series.entry(key).or_insert_with(Vec::new).push((value, name));
        }
    }

    let mut report = MergeReport::default();
    for (key, mut runs) in series {
        runs.sort();
        let target = directory.join(format!("{}{}.txt", key, axis.suffix()));
        let merged = combine(directory, &runs).and_then(|data| fs::write(&target, data).at(&target));
        match merged {
            Ok(()) => {
                info!(path = %target.display(), runs = runs.len(), "merged");
                report.written.push(target);
            }
            Err(e) => {
                warn!(series = %key, error = %e, "not merged");
                report.failed.push((key, e));
            }
        }
    }
    Ok(report)
}
