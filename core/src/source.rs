//! Sample groups and the sources that load them

use crate::error::SourceDataError;
use ndarray::{Array2, Array4, Axis};
use ndarray_npy::ReadNpyExt;
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info};

/// Name of an experimental condition, e.g. `alpha_responder_day0`.
///
/// Used verbatim as a directory name, so path separators and dot names are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleGroupName(String);

impl SampleGroupName {
    /// Validate a group name; it must be usable as a single path component
    pub fn new(name: impl Into<String>) -> Result<Self, SourceDataError> {
        let name = name.into();
        let bad = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if bad {
            return Err(SourceDataError::InvalidGroupName(name));
        }
        Ok(Self(name))
    }

    /// The name as given
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleGroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SampleGroupName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One patient's connectivity matrices, one per time window
#[derive(Debug, Clone, PartialEq)]
pub struct PatientTimeSeries {
    windows: Vec<Array2<f64>>,
}

impl PatientTimeSeries {
    /// Wrap one patient's windows, in time order
    pub fn new(windows: Vec<Array2<f64>>) -> Self {
        Self { windows }
    }

    /// Connectivity matrices, one per window
    pub fn windows(&self) -> &[Array2<f64>] {
        &self.windows
    }

    /// Number of windows
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// True when the patient has no windows
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// All patients of one condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleGroup {
    patients: Vec<PatientTimeSeries>,
}

impl SampleGroup {
    /// Create a group from its patients, in order
    pub fn new(patients: Vec<PatientTimeSeries>) -> Self {
        Self { patients }
    }

    /// Slices a (patients, vertices, vertices, windows) tensor into per-patient series.
    pub fn from_tensor(tensor: &Array4<f64>) -> Self {
        let patients = tensor
            .axis_iter(Axis(0))
            .map(|patient| {
                let windows = patient
                    .axis_iter(Axis(2))
                    .map(|window| window.to_owned())
                    .collect();
                PatientTimeSeries::new(windows)
            })
            .collect();
        Self { patients }
    }

    /// Patients in index order
    pub fn patients(&self) -> &[PatientTimeSeries] {
        &self.patients
    }

    /// Number of patients
    pub fn len(&self) -> usize {
        self.patients.len()
    }

    /// True when the group has no patients
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

/// Sample groups in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleGroups {
    entries: Vec<(SampleGroupName, SampleGroup)>,
}

impl SampleGroups {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a group. Re-inserting a name replaces the group in place and
    /// keeps its original position.
    pub fn insert(&mut self, name: SampleGroupName, group: SampleGroup) -> Option<SampleGroup> {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, group)),
            None => {
                self.entries.push((name, group));
                None
            }
        }
    }

    /// Look up a group by name
    pub fn get(&self, name: &str) -> Option<&SampleGroup> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.as_str() == name)
            .map(|(_, group)| group)
    }

    /// Groups in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&SampleGroupName, &SampleGroup)> {
        self.entries.iter().map(|(name, group)| (name, group))
    }

    /// Group names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no group has been inserted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Supplies the sample groups to encode
pub trait MatrixSource {
    fn load(&self) -> Result<SampleGroups, SourceDataError>;
}

impl MatrixSource for SampleGroups {
    fn load(&self) -> Result<SampleGroups, SourceDataError> {
        Ok(self.clone())
    }
}

/// Loads one `.npy` file per group, each a 4-axis `f64` array shaped
/// (patients, vertices, vertices, windows).
#[derive(Debug, Clone, Default)]
pub struct NpySource {
    files: Vec<(SampleGroupName, PathBuf)>,
}

impl NpySource {
    /// Create a source with no groups
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group read from the `.npy` tensor at `path`
    pub fn with_group(mut self, name: SampleGroupName, path: impl Into<PathBuf>) -> Self {
        self.files.push((name, path.into()));
        self
    }
}

impl MatrixSource for NpySource {
    fn load(&self) -> Result<SampleGroups, SourceDataError> {
        let mut groups = SampleGroups::new();
        for (name, path) in &self.files {
            debug!(group = %name, path = %path.display(), "reading matrix file");
            let file = File::open(path)
                .map_err(|source| SourceDataError::Missing { path: path.clone(), source })?;
            let tensor = Array4::<f64>::read_npy(file)
                .map_err(|source| SourceDataError::Decode { path: path.clone(), source })?;
            let (patients, rows, cols, windows) = tensor.dim();
            info!(group = %name, patients, rows, cols, windows, "loaded sample group");
            groups.insert(name.clone(), SampleGroup::from_tensor(&tensor));
        }
        Ok(groups)
    }
}
