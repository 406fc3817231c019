//! Encodes every patient of every sample group to disk

use crate::encoder::GraphEncoder;
use crate::error::{LayoutError, UnitError};
use crate::layout::{ensure_dir, patient_stem, LayoutWriter};
use crate::report::BatchReport;
use crate::source::{PatientTimeSeries, SampleGroup, SampleGroupName, SampleGroups};
use std::path::PathBuf;
use tracing::{error, info, info_span};

/// Drives [`GraphEncoder`] and [`LayoutWriter`] over all groups and patients.
///
/// A failing group or patient is logged and recorded in the report; the
/// remaining units are still processed.
#[derive(Debug, Clone)]
pub struct DatasetProcessor {
    encoder: GraphEncoder,
    writer: LayoutWriter,
}

impl DatasetProcessor {
    /// Create a processor from an encoder and a layout
    pub fn new(encoder: GraphEncoder, writer: LayoutWriter) -> Self {
        Self { encoder, writer }
    }

    /// Layout the processor writes into
    pub fn writer(&self) -> &LayoutWriter {
        &self.writer
    }

    /// Groups in insertion order, patients in ascending index order.
    pub fn process(&self, groups: &SampleGroups) -> BatchReport {
        let mut report = BatchReport::new();
        if let Err(e) = ensure_dir(self.writer.root()) {
            error!(error = %e, "cannot prepare output root");
            report.record_failure(self.writer.root().display().to_string(), &e);
            return report;
        }

        for (name, group) in groups.iter() {
            let _span = info_span!("dataset", group = %name).entered();
            info!(patients = group.len(), "processing dataset");
            match self.process_group(name, group) {
                Ok(group_report) => report.merge(group_report),
                Err(e) => {
                    error!(error = %e, "dataset failed");
                    report.record_failure(name.to_string(), &e);
                }
            }
        }
        report
    }

    /// Encode every patient of one group; fails only if the group directory cannot be created
    pub fn process_group(
        &self,
        name: &SampleGroupName,
        group: &SampleGroup,
    ) -> Result<BatchReport, LayoutError> {
        ensure_dir(&self.writer.group_dir(name))?;

        let mut report = BatchReport::new();
        for (patient, series) in group.patients().iter().enumerate() {
            match self.process_patient(name, patient, series) {
                Ok(path) => {
                    info!(patient, path = %path.display(), "saved formatted data");
                    report.record_success(path);
                }
                Err(e) => {
                    error!(patient, error = %e, "patient failed");
                    report.record_failure(format!("{}/{}", name, patient_stem(patient)), &e);
                }
            }
        }
        Ok(report)
    }

    /// Encode and write one patient, returning the written file
    pub fn process_patient(
        &self,
        name: &SampleGroupName,
        patient: usize,
        series: &PatientTimeSeries,
    ) -> Result<PathBuf, UnitError> {
        let records = self.encoder.encode(patient, series)?;
        Ok(self.writer.write_transactions(name, patient, &records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::DEFAULT_EXTENSION;
    use ndarray::{array, Array2, Array4};
    use std::fs;
    use tempfile::tempdir;

    fn name(s: &str) -> SampleGroupName {
        SampleGroupName::new(s).unwrap()
    }

    fn processor(root: &std::path::Path) -> DatasetProcessor {
        DatasetProcessor::new(GraphEncoder::new(1.0), LayoutWriter::new(root, DEFAULT_EXTENSION))
    }

    #[test]
    fn writes_one_file_per_patient() {
        let td = tempdir().unwrap();
        let mut groups = SampleGroups::new();
        let mut tensor = Array4::<f64>::zeros((2, 3, 3, 1));
        tensor[[0, 0, 1, 0]] = 2.0;
        groups.insert(name("resp_day0"), SampleGroup::from_tensor(&tensor));

        let report = processor(td.path()).process(&groups);

        assert!(report.is_clean());
        assert_eq!(report.completed.len(), 2);
        let p0 = td.path().join("resp_day0/patient_0/patient_0.txt");
        let expected = "t # 0_0\nv 0 0\nv 1 1\nv 2 2\n\
                        e 0 1 3\ne 0 2 2\ne 1 0 2\ne 1 2 2\ne 2 0 2\ne 2 1 2\nt # -1";
        assert_eq!(fs::read_to_string(p0).unwrap(), expected);
        let p1 = fs::read_to_string(td.path().join("resp_day0/patient_1/patient_1.txt")).unwrap();
        assert!(p1.starts_with("t # 1_0\n"));
        assert!(!p1.contains(" 3\n"));
    }

    #[test]
    fn rerun_produces_identical_bytes() {
        let td = tempdir().unwrap();
        let mut groups = SampleGroups::new();
        let tensor =
            Array4::from_shape_fn((3, 4, 4, 2), |(p, i, j, w)| (p + i * j + w) as f64 / 3.0);
        groups.insert(name("g"), SampleGroup::from_tensor(&tensor));
        let proc = processor(td.path());

        let first = proc.process(&groups);
        let snapshot: Vec<Vec<u8>> = first.completed.iter().map(|p| fs::read(p).unwrap()).collect();
        let second = proc.process(&groups);
        let again: Vec<Vec<u8>> = second.completed.iter().map(|p| fs::read(p).unwrap()).collect();

        assert_eq!(first.completed, second.completed);
        assert_eq!(snapshot, again);
    }

    #[test]
    fn malformed_patient_does_not_stop_others() {
        let td = tempdir().unwrap();
        let good = || PatientTimeSeries::new(vec![array![[0.0, 5.0], [0.0, 0.0]]]);
        let bad = PatientTimeSeries::new(vec![Array2::zeros((2, 3))]);
        let mut groups = SampleGroups::new();
        groups.insert(name("a"), SampleGroup::new(vec![good(), bad, good()]));
        groups.insert(name("b"), SampleGroup::new(vec![good()]));

        let report = processor(td.path()).process(&groups);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, "a/patient_1");
        assert_eq!(report.failures[0].kind, ErrorKind::SourceData);
        assert_eq!(report.completed.len(), 3);
        assert!(!td.path().join("a/patient_1/patient_1.txt").exists());
        let p2 = fs::read_to_string(td.path().join("a/patient_2/patient_2.txt")).unwrap();
        assert_eq!(p2, "t # 2_0\nv 0 0\nv 1 1\ne 0 1 3\ne 1 0 2\nt # -1");
        assert!(td.path().join("b/patient_0/patient_0.txt").is_file());
    }

    #[test]
    fn failing_group_does_not_stop_other_groups() {
        let td = tempdir().unwrap();
        // a plain file where the group directory should go
        fs::write(td.path().join("blocked"), "not a directory").unwrap();
        let one = || SampleGroup::new(vec![PatientTimeSeries::new(vec![Array2::zeros((2, 2))])]);
        let mut groups = SampleGroups::new();
        groups.insert(name("blocked"), one());
        groups.insert(name("open"), one());

        let report = processor(td.path()).process(&groups);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, "blocked");
        assert_eq!(report.failures[0].kind, ErrorKind::Io);
        assert!(td.path().join("open/patient_0/patient_0.txt").is_file());
    }
}
