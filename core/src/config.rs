//! Pipeline and mining configuration

use crate::error::{ConfigError, SourceDataError};
use crate::layout::DEFAULT_EXTENSION;
use crate::source::{NpySource, SampleGroupName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Minimum support: an absolute transaction count or a ratio in `(0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Support {
    Count(u32),
    Ratio(f64),
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Support::Count(n) => write!(f, "{}", n),
            Support::Ratio(r) => write!(f, "{}", r),
        }
    }
}

/// Parameters handed to the mining engine, fixed for a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub min_support: Support,
    pub min_num_vertices: u32,
    /// `None` means unbounded
    pub max_num_vertices: Option<u32>,
    /// `None` scans every transaction
    pub max_ngraphs: Option<u32>,
    pub is_undirected: bool,
    pub verbose: bool,
    pub visualize: bool,
    /// Report embedding locations for each frequent subgraph
    #[serde(rename = "where")]
    pub where_: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            min_support: Support::Count(60),
            min_num_vertices: 3,
            max_num_vertices: None,
            max_ngraphs: None,
            is_undirected: false,
            verbose: false,
            visualize: false,
            where_: true,
        }
    }
}

impl MiningConfig {
    /// Check support and vertex bounds for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.min_support {
            Support::Count(0) => {
                return Err(ConfigError::Invalid("min_support must be positive".into()))
            }
            Support::Ratio(r) if !(r > 0.0 && r <= 1.0) => {
                return Err(ConfigError::Invalid(format!(
                    "min_support ratio {} is outside (0, 1]",
                    r
                )))
            }
            _ => {}
        }
        if let Some(max) = self.max_num_vertices {
            if max < self.min_num_vertices {
                return Err(ConfigError::Invalid(format!(
                    "max_num_vertices {} is below min_num_vertices {}",
                    max, self.min_num_vertices
                )));
            }
        }
        if self.max_ngraphs == Some(0) {
            return Err(ConfigError::Invalid("max_ngraphs must be positive".into()));
        }
        Ok(())
    }
}

/// How to reach the mining engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Registered engine name, `gspan` or `dry-run`
    pub name: String,
    /// Executable for the subprocess engine
    pub program: String,
    /// Argument templates rendered against the mining config and `input`.
    /// Arguments that render empty are dropped.
    pub args: Vec<String>,
    /// Wall-clock bound per invocation; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
    /// Directory under the output root that receives result artifacts
    pub results_dir: String,
}

fn python_bool(var: &str) -> String {
    format!("{{% if {} %}}True{{% else %}}False{{% endif %}}", var)
}

fn optional_flag(flag: &str, var: &str) -> [String; 2] {
    [
        format!("{{% if {} %}}{}{{% endif %}}", var, flag),
        format!("{{% if {} %}}{{{{ {} }}}}{{% endif %}}", var, var),
    ]
}

impl Default for EngineSettings {
    fn default() -> Self {
        let mut args: Vec<String> = vec![
            "-m".into(),
            "gspan_mining".into(),
            "-s".into(),
            "{{ min_support }}".into(),
            "-l".into(),
            "{{ min_num_vertices }}".into(),
        ];
        args.extend(optional_flag("-u", "max_num_vertices"));
        args.extend(optional_flag("-n", "max_ngraphs"));
        args.extend([
            "-d".into(),
            "{% if is_undirected %}False{% else %}True{% endif %}".into(),
            "-v".into(),
            python_bool("verbose"),
            "-p".into(),
            python_bool("visualize"),
            "-w".into(),
            python_bool("where"),
            "{{ input }}".into(),
        ]);

        Self {
            name: "gspan".into(),
            program: "python".into(),
            args,
            timeout_secs: Some(3600),
            results_dir: "subgraphs".into(),
        }
    }
}

/// One `.npy` tensor per sample group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSource {
    pub name: String,
    pub path: PathBuf,
}

/// Whole pipeline configuration, usually loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_root: PathBuf,
    pub extension: String,
    pub edge_threshold: f64,
    pub groups: Vec<GroupSource>,
    pub mining: MiningConfig,
    pub engine: EngineSettings,
    /// Patients mined concurrently; 1 runs sequentially
    pub jobs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("processedData"),
            extension: DEFAULT_EXTENSION.into(),
            edge_threshold: crate::encoder::DEFAULT_EDGE_THRESHOLD,
            groups: Vec::new(),
            mining: MiningConfig::default(),
            engine: EngineSettings::default(),
            jobs: 1,
        }
    }
}

impl PipelineConfig {
    /// Parse a config from YAML text; missing fields take their defaults
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Relative group paths resolve against the config file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config = Self::from_yaml_str(&s)?;
        if let Some(base) = path.parent() {
            for group in &mut config.groups {
                if group.path.is_relative() {
                    group.path = base.join(&group.path);
                }
            }
        }
        Ok(config)
    }

    /// Reject values no phase can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.edge_threshold.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "edge_threshold must be finite, got {}",
                self.edge_threshold
            )));
        }
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!("bad extension {:?}", self.extension)));
        }
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".into()));
        }
        if self.engine.results_dir.is_empty() || self.engine.results_dir.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "bad results_dir {:?}",
                self.engine.results_dir
            )));
        }
        for (i, group) in self.groups.iter().enumerate() {
            if self.groups[..i].iter().any(|g| g.name == group.name) {
                return Err(ConfigError::Invalid(format!("duplicate group {:?}", group.name)));
            }
            // the driver never treats the results directory as a condition
            if group.name == self.engine.results_dir {
                return Err(ConfigError::Invalid(format!(
                    "group {:?} collides with results_dir",
                    group.name
                )));
            }
        }
        self.mining.validate()
    }

    /// Extension without a leading dot
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Build the `.npy` source for the configured groups
    pub fn matrix_source(&self) -> Result<NpySource, SourceDataError> {
        let mut source = NpySource::new();
        for group in &self.groups {
            source = source.with_group(SampleGroupName::new(group.name.clone())?, &group.path);
        }
        Ok(source)
    }
}
