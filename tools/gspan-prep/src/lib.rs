use std::path::PathBuf;
use structopt::StructOpt;
use anyhow::{bail, Result, Context as AnyhowContext};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use conngraph_core::{
    BatchReport, DatasetProcessor, DriverOptions, EngineRegistry, GraphEncoder, LayoutWriter,
    MatrixSource, MiningDriver, PipelineConfig, SampleGroups, Support,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "gspan-prep", about = "Encode connectivity tensors for gSpan and mine them")]
pub struct Opt {
    /// Pipeline configuration (YAML); built-in defaults when omitted
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG wins when set
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    pub verbose: u8,

    #[structopt(subcommand)]
    pub cmd: Cmd,
}

#[derive(StructOpt, Debug)]
pub enum Cmd {
    /// Encode the configured sample groups into transaction files
    Encode(Overrides),
    /// Run the mining engine over an encoded tree
    Mine(Overrides),
    /// Load, encode and mine
    Run(Overrides),
}

impl Cmd {
    fn overrides(&self) -> &Overrides {
        match self {
            Cmd::Encode(o) | Cmd::Mine(o) | Cmd::Run(o) => o,
        }
    }
}

/// Command-line values that take precedence over the config file
#[derive(StructOpt, Debug, Default, Clone)]
pub struct Overrides {
    /// Output root holding one directory per condition
    #[structopt(short = "o", long = "root", parse(from_os_str))]
    pub root: Option<PathBuf>,

    /// Edge weight above which an edge is labeled strong
    #[structopt(long)]
    pub threshold: Option<f64>,

    /// Mining engine (gspan, dry-run)
    #[structopt(long)]
    pub engine: Option<String>,

    /// Patients mined concurrently
    #[structopt(long)]
    pub jobs: Option<usize>,

    /// Minimum support as an absolute count
    #[structopt(long = "min-support")]
    pub min_support: Option<u32>,
}

impl Overrides {
    /// Copy every set flag into `config`
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(root) = &self.root {
            config.output_root = root.clone();
        }
        if let Some(threshold) = self.threshold {
            config.edge_threshold = threshold;
        }
        if let Some(engine) = &self.engine {
            config.engine.name = engine.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(support) = self.min_support {
            config.mining.min_support = Support::Count(support);
        }
    }
}

/// Installs the global fmt subscriber; later calls are no-ops.
pub fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Load the config file (or defaults), apply flags and validate
pub fn load_config(opt: &Opt) -> Result<PipelineConfig> {
    let mut config = match &opt.config {
        Some(path) => {
            PipelineConfig::load(path).with_context(|| format!("read {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    opt.cmd.overrides().apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Read every configured sample group
pub fn load_phase(config: &PipelineConfig) -> Result<SampleGroups> {
    info!("Loading data...");
    let groups = config
        .matrix_source()
        .context("invalid sample group")?
        .load()
        .context("loading sample groups")?;
    if groups.is_empty() {
        warn!("no sample groups configured");
    }
    info!(groups = groups.len(), "Data loading complete");
    Ok(groups)
}

/// Write one transaction file per patient under the output root
pub fn encode_phase(config: &PipelineConfig, groups: &SampleGroups) -> BatchReport {
    info!(
        root = %config.output_root.display(),
        threshold = config.edge_threshold,
        "Processing and formatting data..."
    );
    let processor = DatasetProcessor::new(
        GraphEncoder::new(config.edge_threshold),
        LayoutWriter::new(&config.output_root, config.extension()),
    );
    processor.process(groups)
}

/// Run the configured engine over the encoded tree
pub fn mine_phase(config: &PipelineConfig) -> Result<BatchReport> {
    let engine = EngineRegistry::with_defaults()
        .build(&config.engine)
        .with_context(|| format!("building engine `{}`", config.engine.name))?;
    info!(engine = engine.name(), root = %config.output_root.display(), "Running gSpan...");

    let options = DriverOptions {
        extension: config.extension().to_string(),
        results_dir: config.engine.results_dir.clone(),
        jobs: config.jobs,
    };
    Ok(MiningDriver::new(engine.as_ref(), options).run(&config.output_root, &config.mining))
}

/// Logs a phase summary and returns its failure count.
fn summarize(phase: &str, report: &BatchReport) -> usize {
    for failure in &report.failures {
        error!(phase, unit = %failure.unit, kind = ?failure.kind, "{}", failure.message);
    }
    info!(
        phase,
        completed = report.completed.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "phase complete"
    );
    report.failures.len()
}

/// Runs the selected phases. Fails if a phase cannot start or any unit failed.
pub fn execute(opt: &Opt) -> Result<()> {
    let config = load_config(opt)?;

    let failed = match &opt.cmd {
        Cmd::Encode(_) => {
            let groups = load_phase(&config)?;
            summarize("encode", &encode_phase(&config, &groups))
        }
        Cmd::Mine(_) => summarize("mine", &mine_phase(&config)?),
        Cmd::Run(_) => {
            let groups = load_phase(&config)?;
            let encoded = summarize("encode", &encode_phase(&config, &groups));
            encoded + summarize("mine", &mine_phase(&config)?)
        }
    };

    if failed > 0 {
        bail!("{} unit(s) failed; see log for details", failed);
    }
    Ok(())
}
