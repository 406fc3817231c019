//! Mining engine capability and its bindings
//!
//! The driver only needs `mine` and `save_results`. [`SubprocessEngine`]
//! runs an external gSpan executable; [`DryRunEngine`] validates the
//! transaction file in process and reports its size.

use crate::config::{EngineSettings, MiningConfig};
use crate::error::EngineError;
use crate::transaction::read_transactions;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tera::{Context, Tera};
use tracing::{debug, info};

/// Timing and size figures reported by an engine run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeStats {
    pub elapsed: Duration,
    /// Transactions scanned, when the engine knows it
    pub transactions: Option<usize>,
}

/// Output of one engine invocation on one transaction file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningRun {
    pub input: PathBuf,
    pub output: String,
    pub stats: TimeStats,
}

/// A frequent-subgraph miner invoked once per transaction file
pub trait MiningEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Runs synchronously to completion (or timeout).
    fn mine(&self, input: &Path, config: &MiningConfig) -> Result<MiningRun, EngineError>;

    /// File name of the artifact produced for `input`
    fn artifact_name(&self, input: &Path) -> String {
        let file = input.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        format!("subgraph_{}", file)
    }

    /// Persists `run` inside `results_dir` and returns the artifact path.
    fn save_results(&self, run: &MiningRun, results_dir: &Path) -> Result<PathBuf, EngineError> {
        let path = results_dir.join(self.artifact_name(&run.input));
        fs::write(&path, &run.output)
            .map_err(|source| EngineError::SaveResults { path: path.clone(), source })?;
        Ok(path)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs an external miner, one child process per transaction file.
///
/// Arguments are tera templates rendered with the mining parameters and
/// `input`; stdout becomes the result artifact.
pub struct SubprocessEngine {
    program: String,
    templates: Tera,
    arg_count: usize,
    timeout: Option<Duration>,
}

impl SubprocessEngine {
    /// Compile the argument templates from `settings`
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, EngineError> {
        let mut templates = Tera::default();
        for (i, arg) in settings.args.iter().enumerate() {
            templates
                .add_raw_template(&format!("arg{}", i), arg)
                .map_err(|e| EngineError::Template(format!("argument {} `{}`: {}", i, arg, e)))?;
        }
        Ok(Self {
            program: settings.program.clone(),
            templates,
            arg_count: settings.args.len(),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Renders the argument templates for one input; empty arguments are dropped
    pub fn render_args(
        &self,
        input: &Path,
        config: &MiningConfig,
    ) -> Result<Vec<String>, EngineError> {
        let mut ctx = Context::new();
        ctx.insert("input", &input.display().to_string());
        ctx.insert("min_support", &config.min_support);
        ctx.insert("min_num_vertices", &config.min_num_vertices);
        ctx.insert("max_num_vertices", &config.max_num_vertices);
        ctx.insert("max_ngraphs", &config.max_ngraphs);
        ctx.insert("is_undirected", &config.is_undirected);
        ctx.insert("verbose", &config.verbose);
        ctx.insert("visualize", &config.visualize);
        ctx.insert("where", &config.where_);

        let mut args = Vec::with_capacity(self.arg_count);
        for i in 0..self.arg_count {
            let rendered = self
                .templates
                .render(&format!("arg{}", i), &ctx)
                .map_err(|e| EngineError::Template(format!("argument {}: {}", i, e)))?;
            let rendered = rendered.trim();
            if !rendered.is_empty() {
                args.push(rendered.to_string());
            }
        }
        Ok(args)
    }

    fn timed_out(&self, input: &Path) -> EngineError {
        EngineError::Timeout {
            program: self.program.clone(),
            input: input.to_path_buf(),
            timeout_secs: self.timeout.map_or(0, |t| t.as_secs()),
        }
    }

    fn wait(
        &self,
        child: &mut Child,
        input: &Path,
        deadline: Option<Instant>,
    ) -> Result<ExitStatus, EngineError> {
        let io_err = |source| EngineError::Io { path: input.to_path_buf(), source };
        let Some(deadline) = deadline else {
            return child.wait().map_err(io_err);
        };

        loop {
            if let Some(status) = child.try_wait().map_err(io_err)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                // already-exited races are harmless here
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.timed_out(input));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Waits for a drained pipe, bounded by the run deadline. A grandchild can
    /// hold the pipe open after the child exits.
    fn collect(
        &self,
        pipe: &Receiver<String>,
        input: &Path,
        deadline: Option<Instant>,
    ) -> Result<String, EngineError> {
        let Some(deadline) = deadline else {
            return Ok(pipe.recv().unwrap_or_default());
        };
        match pipe.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(text) => Ok(text),
            Err(RecvTimeoutError::Timeout) => Err(self.timed_out(input)),
            Err(RecvTimeoutError::Disconnected) => Ok(String::new()),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        // receiver is gone once the run has timed out
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

impl MiningEngine for SubprocessEngine {
    fn name(&self) -> &str {
        "gspan"
    }

    fn mine(&self, input: &Path, config: &MiningConfig) -> Result<MiningRun, EngineError> {
        let args = self.render_args(input, config)?;
        let command = format!("{} {}", self.program, args.join(" "));
        info!(command = %command, "running mining engine");

        let start = Instant::now();
        let deadline = self.timeout.map(|t| start + t);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn { program: self.program.clone(), source })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child, input, deadline)?;
        let output = self.collect(&stdout, input, deadline)?;
        let errors = self.collect(&stderr, input, deadline)?;
        let elapsed = start.elapsed();

        if !status.success() {
            return Err(EngineError::NonZeroExit {
                program: self.program.clone(),
                status: status.to_string(),
                input: input.to_path_buf(),
                stderr: errors.trim().to_string(),
            });
        }
        if !errors.trim().is_empty() {
            debug!(stderr = %errors.trim(), "engine diagnostics");
        }

        Ok(MiningRun {
            input: input.to_path_buf(),
            output,
            stats: TimeStats { elapsed, transactions: None },
        })
    }
}

/// Parses the transaction file and reports its size without mining.
///
/// The artifact is a YAML summary; useful for checking a layout before a
/// long mining run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunEngine;

impl MiningEngine for DryRunEngine {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn mine(&self, input: &Path, _config: &MiningConfig) -> Result<MiningRun, EngineError> {
        let start = Instant::now();
        let file = File::open(input)
            .map_err(|source| EngineError::Io { path: input.to_path_buf(), source })?;
        let summary = read_transactions(BufReader::new(file)).map_err(|e| EngineError::Parse {
            path: input.to_path_buf(),
            line: e.line,
            message: e.message,
        })?;
        let output = serde_yaml::to_string(&summary)
            .map_err(|e| EngineError::Template(format!("cannot render summary: {}", e)))?;

        Ok(MiningRun {
            input: input.to_path_buf(),
            output,
            stats: TimeStats { elapsed: start.elapsed(), transactions: Some(summary.transactions) },
        })
    }

    fn artifact_name(&self, input: &Path) -> String {
        let file = input.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        format!("summary_{}", file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Support;
    use tempfile::tempdir;

    const TINY: &str = "t # 0_0\nv 0 0\nv 1 1\ne 0 1 3\ne 1 0 2\nt # -1";

    #[test]
    fn default_template_renders_gspan_command_line() {
        let engine = SubprocessEngine::from_settings(&EngineSettings::default()).unwrap();
        let args = engine
            .render_args(Path::new("/data/g/patient_0/patient_0.txt"), &MiningConfig::default())
            .unwrap();

        assert_eq!(
            args,
            vec![
                "-m", "gspan_mining", "-s", "60", "-l", "3", "-d", "True", "-v", "False", "-p",
                "False", "-w", "True", "/data/g/patient_0/patient_0.txt",
            ]
        );
    }

    #[test]
    fn optional_bounds_appear_only_when_set() {
        let engine = SubprocessEngine::from_settings(&EngineSettings::default()).unwrap();
        let config = MiningConfig {
            min_support: Support::Ratio(0.5),
            max_num_vertices: Some(5),
            max_ngraphs: Some(100),
            is_undirected: true,
            ..Default::default()
        };
        let args = engine.render_args(Path::new("in.txt"), &config).unwrap();
        let joined = args.join(" ");

        assert!(joined.contains("-s 0.5"));
        assert!(joined.contains("-u 5"));
        assert!(joined.contains("-n 100"));
        assert!(joined.contains("-d False"));
    }

    #[test]
    fn bad_template_is_rejected_up_front() {
        let settings = EngineSettings { args: vec!["{{ unclosed".into()], ..Default::default() };
        assert!(matches!(
            SubprocessEngine::from_settings(&settings),
            Err(EngineError::Template(_))
        ));
    }

    #[test]
    fn dry_run_summarizes_and_saves() {
        let td = tempdir().unwrap();
        let input = td.path().join("patient_0.txt");
        fs::write(&input, TINY).unwrap();

        let run = DryRunEngine.mine(&input, &MiningConfig::default()).unwrap();
        assert_eq!(run.stats.transactions, Some(1));
        assert!(run.output.contains("edges: 2"));

        let artifact = DryRunEngine.save_results(&run, td.path()).unwrap();
        assert_eq!(artifact, td.path().join("summary_patient_0.txt"));
        assert_eq!(fs::read_to_string(artifact).unwrap(), run.output);
    }

    #[test]
    fn dry_run_reports_grammar_errors() {
        let td = tempdir().unwrap();
        let input = td.path().join("broken.txt");
        fs::write(&input, "t # 0_0\nv 0 0").unwrap();

        let err = DryRunEngine.mine(&input, &MiningConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let settings = EngineSettings {
            program: "/nonexistent/gspan-binary".into(),
            args: vec!["{{ input }}".into()],
            ..Default::default()
        };
        let engine = SubprocessEngine::from_settings(&settings).unwrap();
        let err = engine.mine(Path::new("x.txt"), &MiningConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    fn shell(script: &str, timeout_secs: Option<u64>) -> SubprocessEngine {
        let settings = EngineSettings {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "sh".into(), "{{ input }}".into()],
            timeout_secs,
            ..Default::default()
        };
        SubprocessEngine::from_settings(&settings).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_as_results() {
        let td = tempdir().unwrap();
        let input = td.path().join("patient_3.txt");
        fs::write(&input, TINY).unwrap();

        let engine = shell("head -n 1 \"$1\"", Some(30));
        let run = engine.mine(&input, &MiningConfig::default()).unwrap();
        assert_eq!(run.output.trim(), "t # 0_0");

        let artifact = engine.save_results(&run, td.path()).unwrap();
        assert_eq!(artifact, td.path().join("subgraph_patient_3.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_engine_failure() {
        let engine = shell("echo boom >&2; exit 3", None);
        let err = engine.mine(Path::new("x.txt"), &MiningConfig::default()).unwrap_err();
        match err {
            EngineError::NonZeroExit { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn lingering_grandchild_cannot_outlive_the_timeout() {
        // the shell exits at once but the background sleep keeps stdout open
        let engine = shell("sleep 8 & echo hi", Some(1));
        let start = Instant::now();
        let err = engine.mine(Path::new("x.txt"), &MiningConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Timeout { timeout_secs: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn slow_engine_is_killed_at_timeout() {
        let engine = shell("sleep 30", Some(1));
        let start = Instant::now();
        let err = engine.mine(Path::new("x.txt"), &MiningConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Timeout { timeout_secs: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(20));
    }
}
