//! Error types for conngraph

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse failure class recorded in batch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing matrix data
    SourceData,

    /// Directory or file creation, read or write failure
    Io,

    /// The mining engine failed for one input file
    EngineInvocation,

    /// Invalid pipeline configuration
    Config,
}

/// Errors that can be classified into an [`ErrorKind`]
pub trait ErrorClass: std::error::Error {
    fn kind(&self) -> ErrorKind;
}

/// Malformed or unreadable connectivity data
#[derive(Debug, Error)]
pub enum SourceDataError {
    /// A window matrix is not square
    #[error("window {window}: matrix is {rows}x{cols}, expected a square matrix")]
    NonSquare {
        window: usize,
        rows: usize,
        cols: usize,
    },

    /// A window disagrees with window 0 on the vertex count
    #[error("window {window}: {found} vertices, window 0 has {expected}")]
    DimensionMismatch {
        window: usize,
        expected: usize,
        found: usize,
    },

    /// Group names become directory names
    #[error("invalid sample group name {0:?}")]
    InvalidGroupName(String),

    /// Matrix file missing or not openable
    #[error("cannot open matrix file {path}: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Matrix file is not a 4-axis f64 array
    #[error("cannot decode matrix file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
}

impl ErrorClass for SourceDataError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::SourceData
    }
}

/// Filesystem failures while laying out or discovering transaction files
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no *.{extension} file in {dir}")]
    MissingTransactionFile { dir: PathBuf, extension: String },

    #[error("{count} *.{extension} files in {dir}, expected exactly one")]
    AmbiguousTransactionFile {
        dir: PathBuf,
        extension: String,
        count: usize,
    },
}

impl ErrorClass for LayoutError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}

/// Failures of a mining engine invocation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown mining engine `{0}`")]
    UnknownEngine(String),

    #[error("invalid command template: {0}")]
    Template(String),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {status} on {input}: {stderr}")]
    NonZeroExit {
        program: String,
        status: String,
        input: PathBuf,
        stderr: String,
    },

    #[error("`{program}` exceeded {timeout_secs}s on {input}")]
    Timeout {
        program: String,
        input: PathBuf,
        timeout_secs: u64,
    },

    #[error("invalid transaction file {path}, line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to save results to {path}: {source}")]
    SaveResults {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ErrorClass for EngineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::EngineInvocation
    }
}

/// Failures while loading or validating the pipeline configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ErrorClass for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// Failure of one unit of batch work (one patient)
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Source(#[from] SourceDataError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ErrorClass for UnitError {
    fn kind(&self) -> ErrorKind {
        match self {
            UnitError::Source(e) => e.kind(),
            UnitError::Layout(e) => e.kind(),
            UnitError::Engine(e) => e.kind(),
        }
    }
}
