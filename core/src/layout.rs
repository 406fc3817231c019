//! On-disk layout of transaction files
//!
//! `root/<group>/patient_<n>/patient_<n>.<ext>`

use crate::error::LayoutError;
use crate::source::SampleGroupName;
use crate::transaction::Record;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_EXTENSION: &str = "txt";

/// Directory and file stem for patient `n`
pub fn patient_stem(patient: usize) -> String {
    format!("patient_{}", patient)
}

/// Creates `path` and its parents. Returns whether anything was created;
/// an existing directory is not an error.
pub fn ensure_dir(path: &Path) -> Result<bool, LayoutError> {
    if path.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(path).map_err(|source| LayoutError::CreateDir {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "created directory");
    Ok(true)
}

/// Writes one transaction file per patient under a root directory
#[derive(Debug, Clone)]
pub struct LayoutWriter {
    root: PathBuf,
    extension: String,
}

impl LayoutWriter {
    /// Create a writer rooted at `root`; `extension` is used without a leading dot
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self { root: root.into(), extension: extension.into() }
    }

    /// Output root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extension of transaction files
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `root/<group>`
    pub fn group_dir(&self, group: &SampleGroupName) -> PathBuf {
        self.root.join(group.as_str())
    }

    /// `root/<group>/patient_<n>`
    pub fn patient_dir(&self, group: &SampleGroupName, patient: usize) -> PathBuf {
        self.group_dir(group).join(patient_stem(patient))
    }

    /// `root/<group>/patient_<n>/patient_<n>.<ext>`
    pub fn patient_file(&self, group: &SampleGroupName, patient: usize) -> PathBuf {
        self.patient_dir(group, patient)
            .join(format!("{}.{}", patient_stem(patient), self.extension))
    }

    /// Writes (or overwrites) the patient's transaction file.
    ///
    /// Records are newline separated with no trailing newline, so identical
    /// input always yields byte-identical files.
    pub fn write_transactions(
        &self,
        group: &SampleGroupName,
        patient: usize,
        records: &[Record],
    ) -> Result<PathBuf, LayoutError> {
        ensure_dir(&self.patient_dir(group, patient))?;
        let path = self.patient_file(group, patient);
        let write_err = |source| LayoutError::Write { path: path.clone(), source };

        let file = File::create(&path).map_err(write_err)?;
        let mut out = BufWriter::new(file);
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                out.write_all(b"\n").map_err(write_err)?;
            }
            write!(out, "{}", record).map_err(write_err)?;
        }
        out.flush().map_err(write_err)?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionId;
    use tempfile::tempdir;

    #[test]
    fn paths_follow_group_patient_layout() {
        let writer = LayoutWriter::new("/data/out", "txt");
        let group = SampleGroupName::new("alpha_responder_day0").unwrap();
        assert_eq!(
            writer.patient_file(&group, 12),
            PathBuf::from("/data/out/alpha_responder_day0/patient_12/patient_12.txt")
        );
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let td = tempdir().unwrap();
        let dir = td.path().join("a/b");
        assert!(ensure_dir(&dir).unwrap());
        assert!(!ensure_dir(&dir).unwrap());
        assert!(dir.is_dir());
    }

    #[test]
    fn write_overwrites_previous_contents() {
        let td = tempdir().unwrap();
        let writer = LayoutWriter::new(td.path(), DEFAULT_EXTENSION);
        let group = SampleGroupName::new("g").unwrap();
        let long = vec![
            Record::Header(TransactionId { patient: 0, window: 0 }),
            Record::Vertex { index: 0, label: 0 },
            Record::Sentinel,
        ];

        writer.write_transactions(&group, 0, &long).unwrap();
        let path = writer.write_transactions(&group, 0, &[Record::Sentinel]).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "t # -1");
    }
}
