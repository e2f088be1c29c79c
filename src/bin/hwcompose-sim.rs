use std::{
    fs::File,
    io::{BufReader, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::Parser;
use hwcompose::{
    CommitReport, Composer, DisplayKind, FramePlan, HwcConfig, Layer, MemoryHardware,
};

#[derive(Parser, Debug)]
#[command(name = "hwcompose-sim", version)]
struct Cli {
    /// Scenario JSON: a list of steps replayed in order.
    scenario: PathBuf,

    /// Board config JSON. The reference board is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compose every frame on the GPU.
    #[arg(long)]
    force_gpu: bool,

    /// Fail buffer allocations once this many scaler buffers are live.
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// Print the composer dump after the last step.
    #[arg(long)]
    dump: bool,

    /// Log composer decisions to stderr.
    #[arg(long, short)]
    verbose: bool,
}

/// One scenario step.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    /// Prepare then commit one frame.
    Frame {
        display: DisplayKind,
        #[serde(default)]
        geometry_changed: bool,
        layers: Vec<Layer>,
    },
    ConnectExternal,
    DisconnectExternal,
    TeardownLocalPath {
        display: DisplayKind,
    },
}

#[derive(serde::Serialize)]
struct FrameOutput<'a> {
    step: usize,
    plan: &'a FramePlan,
    report: CommitReport,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = match &cli.config {
        Some(path) => HwcConfig::from_path(path)?,
        None => HwcConfig::default(),
    };
    config.options.force_gpu |= cli.force_gpu;
    let steps = read_scenario(&cli.scenario)?;

    let hw = MemoryHardware::new();
    hw.set_buffer_capacity(cli.buffer_capacity);
    let mut composer = Composer::new(config, hw.devices())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (i, step) in steps.into_iter().enumerate() {
        match step {
            Step::Frame {
                display,
                geometry_changed,
                mut layers,
            } => {
                let plan = composer.prepare(display, &mut layers, geometry_changed);
                let report = composer.commit(display, &mut layers);
                let line = serde_json::to_string(&FrameOutput {
                    step: i,
                    plan: &plan,
                    report,
                })
                .context("serialize frame plan")?;
                writeln!(out, "{line}")?;
            }
            Step::ConnectExternal => composer
                .connect_external()
                .with_context(|| format!("step {i}: connect external display"))?,
            Step::DisconnectExternal => composer.disconnect_external(),
            Step::TeardownLocalPath { display } => {
                composer.teardown_local_path(display);
            }
        }
    }

    if cli.dump {
        writeln!(out, "{}", composer.dump()?)?;
    }
    Ok(())
}

fn read_scenario(path: &Path) -> anyhow::Result<Vec<Step>> {
    let f = File::open(path).with_context(|| format!("open scenario '{}'", path.display()))?;
    let steps: Vec<Step> = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse scenario JSON '{}'", path.display()))?;
    Ok(steps)
}
