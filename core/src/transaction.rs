//! gSpan transaction file grammar
//!
//! One record per line, space separated:
//!
//! ```text
//! t # 0_0        transaction header (patient_window)
//! v 0 0          vertex, label equals index
//! e 0 1 3        directed edge, label 2 (weak) or 3 (strong)
//! t # -1         end of input, exactly once
//! ```

use serde::Serialize;
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Composite id of one graph: originating patient and time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId {
    pub patient: usize,
    pub window: usize,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.patient, self.window)
    }
}

/// Binary quantization of an edge weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeLabel {
    /// Weight at or below the threshold
    Weak,
    /// Weight strictly above the threshold
    Strong,
}

impl EdgeLabel {
    /// NaN never exceeds the threshold and classifies as weak.
    pub fn classify(weight: f64, threshold: f64) -> Self {
        if weight > threshold {
            EdgeLabel::Strong
        } else {
            EdgeLabel::Weak
        }
    }

    /// Numeric label written on `e` lines
    pub fn code(self) -> u8 {
        match self {
            EdgeLabel::Weak => 2,
            EdgeLabel::Strong => 3,
        }
    }

    /// Inverse of [`EdgeLabel::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(EdgeLabel::Weak),
            3 => Some(EdgeLabel::Strong),
            _ => None,
        }
    }
}

/// One line of a transaction file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Header(TransactionId),
    Vertex { index: usize, label: usize },
    Edge { src: usize, dst: usize, label: EdgeLabel },
    Sentinel,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Header(id) => write!(f, "t # {}", id),
            Record::Vertex { index, label } => write!(f, "v {} {}", index, label),
            Record::Edge { src, dst, label } => write!(f, "e {} {} {}", src, dst, label.code()),
            Record::Sentinel => f.write_str("t # -1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRecordError {
    #[error("empty record")]
    Empty,
    #[error("unknown record type `{0}`")]
    UnknownTag(String),
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid number `{0}`")]
    Number(String),
    #[error("invalid transaction id `{0}`")]
    TransactionId(String),
    #[error("edge label must be 2 or 3, found {0}")]
    EdgeLabel(u8),
}

fn number<T: FromStr>(field: &str) -> Result<T, ParseRecordError> {
    field.parse().map_err(|_| ParseRecordError::Number(field.to_string()))
}

impl FromStr for Record {
    type Err = ParseRecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let expect = |n: usize| {
            if fields.len() == n {
                Ok(())
            } else {
                Err(ParseRecordError::FieldCount { expected: n, found: fields.len() })
            }
        };

        match fields.first().copied() {
            None => Err(ParseRecordError::Empty),
            Some("t") => {
                expect(3)?;
                if fields[1] != "#" {
                    return Err(ParseRecordError::TransactionId(line.trim().to_string()));
                }
                if fields[2] == "-1" {
                    return Ok(Record::Sentinel);
                }
                let (patient, window) = fields[2]
                    .split_once('_')
                    .ok_or_else(|| ParseRecordError::TransactionId(fields[2].to_string()))?;
                Ok(Record::Header(TransactionId {
                    patient: number(patient)?,
                    window: number(window)?,
                }))
            }
            Some("v") => {
                expect(3)?;
                Ok(Record::Vertex { index: number(fields[1])?, label: number(fields[2])? })
            }
            Some("e") => {
                expect(4)?;
                let code: u8 = number(fields[3])?;
                let label = EdgeLabel::from_code(code).ok_or(ParseRecordError::EdgeLabel(code))?;
                Ok(Record::Edge { src: number(fields[1])?, dst: number(fields[2])?, label })
            }
            Some(other) => Err(ParseRecordError::UnknownTag(other.to_string())),
        }
    }
}

/// Counts gathered while reading a transaction file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub transactions: usize,
    pub vertices: usize,
    pub edges: usize,
    pub strong_edges: usize,
}

/// Structural error in a transaction file, with its 1-based line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct GrammarError {
    pub line: usize,
    pub message: String,
}

impl GrammarError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }
}

/// Reads and validates a whole transaction file.
///
/// Enforces that vertices and edges only appear inside a transaction, that
/// edges reference declared vertices and are not self-loops, and that the
/// sentinel appears exactly once as the final record. Blank lines are ignored.
pub fn read_transactions<R: BufRead>(reader: R) -> Result<TransactionSummary, GrammarError> {
    let mut summary = TransactionSummary::default();
    let mut vertices_in_current: Option<usize> = None;
    let mut sentinel_seen = false;
    let mut last_line = 0;

    for (idx, line) in reader.lines().enumerate() {
        let lineno = idx + 1;
        let line = line.map_err(|e| GrammarError::at(lineno, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        last_line = lineno;
        if sentinel_seen {
            return Err(GrammarError::at(lineno, "record after end-of-input sentinel"));
        }

        let record: Record = line
            .parse()
            .map_err(|e: ParseRecordError| GrammarError::at(lineno, e.to_string()))?;
        match record {
            Record::Header(_) => {
                summary.transactions += 1;
                vertices_in_current = Some(0);
            }
            Record::Vertex { .. } => {
                let count = vertices_in_current
                    .as_mut()
                    .ok_or_else(|| GrammarError::at(lineno, "vertex outside a transaction"))?;
                *count += 1;
                summary.vertices += 1;
            }
            Record::Edge { src, dst, label } => {
                let count = vertices_in_current
                    .ok_or_else(|| GrammarError::at(lineno, "edge outside a transaction"))?;
                if src == dst {
                    return Err(GrammarError::at(lineno, format!("self-loop on vertex {}", src)));
                }
                if src >= count || dst >= count {
                    return Err(GrammarError::at(
                        lineno,
                        format!("edge {} -> {} references an undeclared vertex", src, dst),
                    ));
                }
                summary.edges += 1;
                if label == EdgeLabel::Strong {
                    summary.strong_edges += 1;
                }
            }
            Record::Sentinel => sentinel_seen = true,
        }
    }

    if !sentinel_seen {
        return Err(GrammarError::at(last_line, "missing end-of-input sentinel `t # -1`"));
    }
    Ok(summary)
}
