//! Connectivity matrices to labeled-graph transactions

use crate::error::SourceDataError;
use crate::source::PatientTimeSeries;
use crate::transaction::{EdgeLabel, Record, TransactionId};

/// Default weight above which an edge is labeled strong
pub const DEFAULT_EDGE_THRESHOLD: f64 = 1.0;

/// Encodes one patient's windows as gSpan transactions.
///
/// Each window becomes one graph with a vertex per matrix row (label equal
/// to its index) and a directed edge for every ordered pair `i != j`. Edges
/// are labeled strong when the weight strictly exceeds the threshold. The
/// output ends with a single sentinel record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEncoder {
    edge_threshold: f64,
}

impl Default for GraphEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_EDGE_THRESHOLD)
    }
}

impl GraphEncoder {
    /// Create an encoder labeling edges above `edge_threshold` as strong
    pub fn new(edge_threshold: f64) -> Self {
        Self { edge_threshold }
    }

    /// Weight above which an edge is labeled strong
    pub fn edge_threshold(&self) -> f64 {
        self.edge_threshold
    }

    /// All windows must be square and share window 0's vertex count.
    pub fn encode(
        &self,
        patient: usize,
        series: &PatientTimeSeries,
    ) -> Result<Vec<Record>, SourceDataError> {
        let vertices = check_dimensions(series)?;
        let per_window = 1 + vertices + vertices * vertices.saturating_sub(1);
        let mut records = Vec::with_capacity(series.len() * per_window + 1);

        for (window, matrix) in series.windows().iter().enumerate() {
            records.push(Record::Header(TransactionId { patient, window }));
            records.extend((0..vertices).map(|index| Record::Vertex { index, label: index }));
            for ((src, dst), &weight) in matrix.indexed_iter() {
                if src != dst {
                    let label = EdgeLabel::classify(weight, self.edge_threshold);
                    records.push(Record::Edge { src, dst, label });
                }
            }
        }
        records.push(Record::Sentinel);

        Ok(records)
    }

    /// Encode one patient and render every record as a line
    pub fn encode_lines(
        &self,
        patient: usize,
        series: &PatientTimeSeries,
    ) -> Result<Vec<String>, SourceDataError> {
        Ok(self.encode(patient, series)?.iter().map(ToString::to_string).collect())
    }
}

fn check_dimensions(series: &PatientTimeSeries) -> Result<usize, SourceDataError> {
    let mut expected = None;
    for (window, matrix) in series.windows().iter().enumerate() {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(SourceDataError::NonSquare { window, rows, cols });
        }
        match expected {
            None => expected = Some(rows),
            Some(n) if n != rows => {
                return Err(SourceDataError::DimensionMismatch { window, expected: n, found: rows })
            }
            Some(_) => {}
        }
    }
    Ok(expected.unwrap_or(0))
}
