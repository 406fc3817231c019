//! # conngraph core
//!
//! Turns windowed connectivity tensors into gSpan transaction files and runs
//! a frequent-subgraph miner over the resulting directory tree.
//!
//! ## Example
//!
//! ```rust
//! use conngraph_core::{GraphEncoder, PatientTimeSeries};
//! use ndarray::array;
//!
//! let series = PatientTimeSeries::new(vec![array![[0.0, 2.0], [0.5, 0.0]]]);
//! let lines = GraphEncoder::new(1.0).encode_lines(0, &series).unwrap();
//! assert_eq!(lines, ["t # 0_0", "v 0 0", "v 1 1", "e 0 1 3", "e 1 0 2", "t # -1"]);
//! ```

pub mod config;
pub mod dataset;
pub mod driver;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod layout;
pub mod registry;
pub mod report;
pub mod source;
pub mod transaction;

pub use config::{EngineSettings, GroupSource, MiningConfig, PipelineConfig, Support};
pub use dataset::DatasetProcessor;
pub use driver::{DriverOptions, MiningDriver};
pub use encoder::{GraphEncoder, DEFAULT_EDGE_THRESHOLD};
pub use engine::{DryRunEngine, MiningEngine, MiningRun, SubprocessEngine, TimeStats};
pub use error::{
    ConfigError, EngineError, ErrorClass, ErrorKind, LayoutError, SourceDataError, UnitError,
};
pub use layout::{LayoutWriter, DEFAULT_EXTENSION};
pub use registry::EngineRegistry;
pub use report::{BatchReport, UnitFailure};
pub use source::{
    MatrixSource, NpySource, PatientTimeSeries, SampleGroup, SampleGroupName, SampleGroups,
};
pub use transaction::{read_transactions, EdgeLabel, Record, TransactionId, TransactionSummary};
