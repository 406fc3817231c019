//! Walks an encoded tree and runs the mining engine per patient
//!
//! ```text
//! root/
//!   <condition>/patient_<n>/patient_<n>.<ext>   inputs
//!   subgraphs/<condition>/<artifact>            results
//! ```

use crate::config::MiningConfig;
use crate::engine::MiningEngine;
use crate::error::{LayoutError, UnitError};
use crate::layout::{ensure_dir, DEFAULT_EXTENSION};
use crate::report::BatchReport;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};

/// Discovery and failure-isolation settings for a mining run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    pub extension: String,
    /// Name of the results directory under the root; never treated as a condition
    pub results_dir: String,
    /// Patients mined concurrently within a condition
    pub jobs: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.into(),
            results_dir: "subgraphs".into(),
            jobs: 1,
        }
    }
}

/// Directory entries sorted by name
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, LayoutError> {
    let read_err = |source| LayoutError::ReadDir { path: dir.to_path_buf(), source };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        entries.push(entry.map_err(read_err)?.path());
    }
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Runs a [`MiningEngine`] over every patient file under a root.
///
/// Every condition and every patient is its own failure boundary: errors
/// are logged, recorded in the returned report, and the walk continues.
pub struct MiningDriver<'a> {
    engine: &'a dyn MiningEngine,
    options: DriverOptions,
}

impl<'a> MiningDriver<'a> {
    /// Create a driver around `engine`
    pub fn new(engine: &'a dyn MiningEngine, options: DriverOptions) -> Self {
        Self { engine, options }
    }

    /// Mine every condition directory under `root`, one patient at a time unless `jobs > 1`
    pub fn run(&self, root: &Path, config: &MiningConfig) -> BatchReport {
        let mut report = BatchReport::new();
        let conditions = match sorted_entries(root) {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "cannot list output root");
                report.record_failure(root.display().to_string(), &e);
                return report;
            }
        };

        for condition in conditions {
            if file_name(&condition) == self.options.results_dir {
                continue;
            }
            if !condition.is_dir() {
                warn!(path = %condition.display(), "Skipping non-directory entry");
                report.record_skip(condition);
                continue;
            }
            match self.run_condition(&condition, config) {
                Ok(condition_report) => report.merge(condition_report),
                Err(e) => {
                    error!(condition = %condition.display(), error = %e, "condition failed");
                    report.record_failure(file_name(&condition), &e);
                }
            }
        }
        report
    }

    /// Results land in `<condition>/../<results_dir>/<condition>/`.
    pub fn run_condition(
        &self,
        condition_dir: &Path,
        config: &MiningConfig,
    ) -> Result<BatchReport, LayoutError> {
        let condition = file_name(condition_dir);
        let _span = info_span!("condition", condition = %condition).entered();

        let results_dir = condition_dir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.options.results_dir)
            .join(&condition);
        ensure_dir(&results_dir)?;

        let mut report = BatchReport::new();
        let mut patients = Vec::new();
        for entry in sorted_entries(condition_dir)? {
            if entry.is_dir() {
                patients.push(entry);
            } else {
                warn!(path = %entry.display(), "Skipping non-directory entry");
                report.record_skip(entry);
            }
        }
        info!(patients = patients.len(), "mining condition");

        if self.options.jobs > 1 && patients.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.options.jobs).build() {
                Ok(pool) => {
                    let shared = Mutex::new(report);
                    pool.install(|| {
                        patients.par_iter().for_each(|patient_dir| {
                            let mut local = BatchReport::new();
                            self.mine_into(
                                &condition,
                                patient_dir,
                                &results_dir,
                                config,
                                &mut local,
                            );
                            shared.lock().merge(local);
                        })
                    });
                    let mut report = shared.into_inner();
                    report.normalize();
                    return Ok(report);
                }
                Err(e) => warn!(error = %e, "thread pool unavailable, mining sequentially"),
            }
        }

        for patient_dir in &patients {
            self.mine_into(&condition, patient_dir, &results_dir, config, &mut report);
        }
        Ok(report)
    }

    fn mine_into(
        &self,
        condition: &str,
        patient_dir: &Path,
        results_dir: &Path,
        config: &MiningConfig,
        report: &mut BatchReport,
    ) {
        match self.mine_patient(patient_dir, results_dir, config) {
            Ok(artifact) => report.record_success(artifact),
            Err(e) => {
                error!(patient = %patient_dir.display(), error = %e, "mining failed");
                report.record_failure(format!("{}/{}", condition, file_name(patient_dir)), &e);
            }
        }
    }

    /// Mines the single transaction file in `patient_dir` and saves the artifact.
    pub fn mine_patient(
        &self,
        patient_dir: &Path,
        results_dir: &Path,
        config: &MiningConfig,
    ) -> Result<PathBuf, UnitError> {
        let input = self.discover_patient_file(patient_dir)?;
        info!(input = %input.display(), engine = self.engine.name(), "found data file");

        let run = self.engine.mine(&input, config)?;
        info!(
            input = %input.display(),
            elapsed_ms = run.stats.elapsed.as_millis() as u64,
            transactions = ?run.stats.transactions,
            "engine finished"
        );
        Ok(self.engine.save_results(&run, results_dir)?)
    }

    /// The one regular file in `patient_dir` with the configured extension.
    pub fn discover_patient_file(&self, patient_dir: &Path) -> Result<PathBuf, LayoutError> {
        let ext = self.options.extension.trim_start_matches('.');
        let matches: Vec<PathBuf> = sorted_entries(patient_dir)?
            .into_iter()
            .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == ext))
            .collect();

        match matches.len() {
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            0 => Err(LayoutError::MissingTransactionFile {
                dir: patient_dir.to_path_buf(),
                extension: ext.to_string(),
            }),
            count => Err(LayoutError::AmbiguousTransactionFile {
                dir: patient_dir.to_path_buf(),
                extension: ext.to_string(),
                count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DryRunEngine, MiningRun, TimeStats};
    use crate::error::{EngineError, ErrorKind};
    use std::time::Duration;
    use tempfile::tempdir;

    const TINY: &str = "t # 0_0\nv 0 0\nv 1 1\ne 0 1 3\ne 1 0 2\nt # -1";

    /// Records every input it is asked to mine; fails on names in `fail_on`.
    #[derive(Default)]
    struct RecordingEngine {
        seen: Mutex<Vec<PathBuf>>,
        fail_on: Vec<String>,
    }

    impl MiningEngine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        fn mine(&self, input: &Path, config: &MiningConfig) -> Result<MiningRun, EngineError> {
            self.seen.lock().push(input.to_path_buf());
            if self.fail_on.iter().any(|f| input.ends_with(f)) {
                return Err(EngineError::NonZeroExit {
                    program: "recording".into(),
                    status: "exit status: 1".into(),
                    input: input.to_path_buf(),
                    stderr: String::new(),
                });
            }
            Ok(MiningRun {
                input: input.to_path_buf(),
                output: format!("support={}", config.min_support),
                stats: TimeStats { elapsed: Duration::from_millis(1), transactions: None },
            })
        }
    }

    fn patient(root: &Path, condition: &str, n: usize) -> PathBuf {
        let dir = root.join(condition).join(format!("patient_{}", n));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join(format!("patient_{}.txt", n));
        fs::write(&file, TINY).unwrap();
        file
    }

    #[test]
    fn stray_file_is_skipped_and_valid_patient_mined() {
        let td = tempdir().unwrap();
        let input = patient(td.path(), "resp_day0", 0);
        let stray = td.path().join("resp_day0/notes.txt");
        fs::write(&stray, "scratch").unwrap();

        let engine = RecordingEngine::default();
        let report = MiningDriver::new(&engine, DriverOptions::default())
            .run(td.path(), &MiningConfig::default());

        assert_eq!(*engine.seen.lock(), vec![input]);
        assert_eq!(report.skipped, vec![stray]);
        assert!(report.is_clean());
        let artifact = td.path().join("subgraphs/resp_day0/subgraph_patient_0.txt");
        assert_eq!(report.completed, vec![artifact.clone()]);
        assert_eq!(fs::read_to_string(artifact).unwrap(), "support=60");
    }

    #[test]
    fn root_level_files_and_results_dir_are_not_conditions() {
        let td = tempdir().unwrap();
        patient(td.path(), "c", 0);
        fs::write(td.path().join("README"), "x").unwrap();

        let engine = RecordingEngine::default();
        let driver = MiningDriver::new(&engine, DriverOptions::default());
        driver.run(td.path(), &MiningConfig::default());
        // second run must not descend into the results directory
        let report = driver.run(td.path(), &MiningConfig::default());

        assert_eq!(engine.seen.lock().len(), 2);
        assert_eq!(report.skipped, vec![td.path().join("README")]);
        assert!(report.is_clean());
    }

    #[test]
    fn failing_patient_does_not_stop_the_condition() {
        let td = tempdir().unwrap();
        for n in 0..3 {
            patient(td.path(), "c", n);
        }
        patient(td.path(), "d", 0);
        let engine =
            RecordingEngine { fail_on: vec!["patient_1.txt".into()], ..Default::default() };

        let report = MiningDriver::new(&engine, DriverOptions::default())
            .run(td.path(), &MiningConfig::default());

        assert_eq!(engine.seen.lock().len(), 4);
        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, "c/patient_1");
        assert_eq!(report.failures[0].kind, ErrorKind::EngineInvocation);
    }

    #[test]
    fn missing_and_ambiguous_files_are_io_failures() {
        let td = tempdir().unwrap();
        fs::create_dir_all(td.path().join("c/patient_0")).unwrap();
        patient(td.path(), "c", 1);
        fs::write(td.path().join("c/patient_1/extra.txt"), TINY).unwrap();
        patient(td.path(), "c", 2);

        let engine = RecordingEngine::default();
        let report = MiningDriver::new(&engine, DriverOptions::default())
            .run(td.path(), &MiningConfig::default());

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failures_of(ErrorKind::Io), 2);
        assert_eq!(engine.seen.lock().len(), 1);
    }

    #[test]
    fn other_extensions_are_ignored_during_discovery() {
        let td = tempdir().unwrap();
        let input = patient(td.path(), "c", 0);
        fs::write(input.with_extension("pickle"), "results").unwrap();

        let engine = RecordingEngine::default();
        let driver = MiningDriver::new(&engine, DriverOptions::default());
        assert_eq!(driver.discover_patient_file(input.parent().unwrap()).unwrap(), input);
    }

    #[test]
    fn parallel_run_matches_sequential() {
        let td = tempdir().unwrap();
        for n in 0..6 {
            patient(td.path(), "c", n);
        }

        let sequential = MiningDriver::new(&DryRunEngine, DriverOptions::default())
            .run(td.path(), &MiningConfig::default());
        let options = DriverOptions { jobs: 3, ..Default::default() };
        let parallel =
            MiningDriver::new(&DryRunEngine, options).run(td.path(), &MiningConfig::default());

        assert_eq!(sequential.completed.len(), 6);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn unreadable_root_is_reported() {
        let engine = RecordingEngine::default();
        let report = MiningDriver::new(&engine, DriverOptions::default())
            .run(Path::new("/nonexistent/root"), &MiningConfig::default());
        assert_eq!(report.failures_of(ErrorKind::Io), 1);
    }
}
