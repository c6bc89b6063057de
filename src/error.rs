//! Errors raised by the sweep, merge and averaging tools.
//!
//! Per-cell execution problems (a benchmark exiting non-zero, a binary that
//! cannot be spawned) are not errors; they are recorded as
//! [`CellOutcome`](crate::driver::CellOutcome)s and the sweep continues.
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Coarse grouping of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad templates, names or config files. Aborts before anything runs.
    Configuration,
    /// A single aggregation input is unusable. Batches skip it and go on.
    Aggregation,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown placeholder `{{{name}}}` in template `{template}`")]
    UnknownPlaceholder { template: String, name: String },

    #[error("unterminated placeholder in template `{0}`")]
    UnterminatedPlaceholder(String),

    #[error("placeholder `{{{name}}}` must be a whole argument in `{template}`")]
    SplicedPlaceholder { template: String, name: String },

    #[error("unknown benchmark kind `{0}`")]
    UnknownKind(String),

    #[error("unknown preset `{0}`")]
    UnknownPreset(String),

    #[error("unknown machine profile `{0}`")]
    UnknownProfile(String),

    #[error("no {0} given")]
    EmptyAxis(&'static str),

    #[error("executable `{program}` for queue `{queue}` was not found")]
    ExecutableNotFound { queue: String, program: String },

    #[error("empty executable spec for queue `{0}`")]
    EmptyExecutable(String),

    #[error("unsupported config version {0}, expected {1}")]
    UnsupportedVersion(u32, u32),

    #[error("malformed config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("the file {0} does not exist")]
    MissingFile(PathBuf),

    #[error("the file {0} is empty")]
    EmptyFile(PathBuf),

    #[error("{path} has {found} values, expected {expected}")]
    TokenCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("column {column} of {path} mixes numeric and non-numeric values")]
    MixedColumn { path: PathBuf, column: usize },

    #[error("output directory {0} is also an input directory")]
    OutputIsInput(PathBuf),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        use self::Error::*;
        match *self {
            UnknownPlaceholder { .. }
            | UnterminatedPlaceholder(_)
            | SplicedPlaceholder { .. }
            | UnknownKind(_)
            | UnknownPreset(_)
            | UnknownProfile(_)
            | EmptyAxis(_)
            | ExecutableNotFound { .. }
            | EmptyExecutable(_)
            | UnsupportedVersion(..)
            | Toml { .. } => ErrorClass::Configuration,
            NotADirectory(_)
            | MissingFile(_)
            | EmptyFile(_)
            | TokenCountMismatch { .. }
            | MixedColumn { .. }
            | OutputIsInput(_) => ErrorClass::Aggregation,
            Io { .. } => ErrorClass::Io,
        }
    }
}

/// Attach a path to an `io::Error`.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
