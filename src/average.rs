//! Column-wise means over repeated runs.
//!
//! Each input directory holds the same set of single-line result files. For
//! one file name, token `i` of the output is the mean of token `i` across the
//! directories when it is numeric, and the first directory's token otherwise.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, IoContext, Result};

/// What to do with a column that is numeric in the first file but not in
/// some other file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixedColumnPolicy {
    /// Refuse to average the file.
    Reject,
    /// Count the non-numeric values as zero.
    Zero,
}

impl Default for MixedColumnPolicy {
    fn default() -> Self {
        MixedColumnPolicy::Reject
    }
}

/// Digits with at most one decimal point, e.g. `1200` or `3.5`.
pub fn is_numeric(token: &str) -> bool {
    let mut dots = 0;
    let mut digits = 0;
    for b in token.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

/// Integral means keep a trailing `.0`.
pub fn format_mean(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

fn tokens(content: &str) -> Vec<&str> {
    let line = content
        .strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(content);
    line.split(' ').collect()
}

/// Average already-split rows. `paths[i]` names the source of `rows[i]` and
/// is only used in errors.
fn average_rows(rows: &[Vec<&str>], paths: &[PathBuf], policy: MixedColumnPolicy) -> Result<String> {
    let first = &rows[0];
    for (row, path) in rows.iter().zip(paths) {
        if row.len() != first.len() {
            return Err(Error::TokenCountMismatch {
                path: path.clone(),
                expected: first.len(),
                found: row.len(),
            });
        }
    }

    let mut out = vec![];
    for (column, token) in first.iter().enumerate() {
        if is_numeric(token) {
            let mut sum = 0.0;
            for (row, path) in rows.iter().zip(paths) {
                match row[column].parse::<f64>() {
                    Ok(v) if is_numeric(row[column]) => sum += v,
                    _ if policy == MixedColumnPolicy::Zero => {}
                    _ => {
                        return Err(Error::MixedColumn {
                            path: path.clone(),
                            column,
                        })
                    }
                }
            }
            out.push(format_mean(sum / rows.len() as f64));
        } else if !token.contains('\n') {
            out.push(token.to_string());
        }
    }
    let mut line = out.join(" ");
    line.push('\n');
    Ok(line)
}

/// Average `filename` across `directories` into `output_dir/filename`.
///
/// Nothing is written if any input is missing, empty or has a different
/// number of values than the first.
pub fn average(
    filename: &str,
    directories: &[PathBuf],
    output_dir: &Path,
    policy: MixedColumnPolicy,
) -> Result<PathBuf> {
    let mut contents = Vec::with_capacity(directories.len());
    let mut paths = Vec::with_capacity(directories.len());
    for dir in directories {
        let path = dir.join(filename);
        if !path.is_file() {
            return Err(Error::MissingFile(path));
        }
        let content = fs::read_to_string(&path).at(&path)?;
        if content.is_empty() {
            return Err(Error::EmptyFile(path));
        }
        contents.push(content);
        paths.push(path);
    }
    if contents.is_empty() {
        return Err(Error::EmptyAxis("input directories"));
    }

    let rows: Vec<Vec<&str>> = contents.iter().map(|c| tokens(c)).collect();
    let line = average_rows(&rows, &paths, policy)?;
    let target = output_dir.join(filename);
    fs::write(&target, line).at(&target)?;
    Ok(target)
}

#[derive(Debug, Default)]
pub struct AverageReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, Error)>,
}

/// Average every file of the first directory. Failures are logged and
/// collected; they do not stop the batch.
pub fn average_all(directories: &[PathBuf], output_dir: &Path, policy: MixedColumnPolicy) -> Result<AverageReport> {
    let first = directories
        .first()
        .ok_or(Error::EmptyAxis("input directories"))?;
    if !first.is_dir() {
        return Err(Error::NotADirectory(first.clone()));
    }
    let mut names = vec![];
    for entry in fs::read_dir(first).at(first)? {
        let entry = entry.at(first)?;
        if !entry.path().is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();

    let mut report = AverageReport::default();
    for name in names {
        match average(&name, directories, output_dir, policy) {
            Ok(path) => report.written.push(path),
            Err(e) => {
                warn!(file = %name, error = %e, "not averaged");
                report.failed.push((name, e));
            }
        }
    }
    info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "averaging finished"
    );
    Ok(report)
}

/// Remove and recreate `output_dir`, refusing to touch an input directory.
pub fn prepare_output(output_dir: &Path, directories: &[PathBuf]) -> Result<()> {
    if output_dir.exists() {
        let out = fs::canonicalize(output_dir).at(output_dir)?;
        for dir in directories {
            if fs::canonicalize(dir).map(|d| d == out).unwrap_or(false) {
                return Err(Error::OutputIsInput(output_dir.to_path_buf()));
            }
        }
        fs::remove_dir_all(output_dir).at(output_dir)?;
    }
    fs::create_dir_all(output_dir).at(output_dir)
}
