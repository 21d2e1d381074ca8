//! excl CLI: CLs exclusion limits for counting experiments.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use excl_inference::{
    hypothesis_test, upper_limit, upper_limit_scan, AsymptoticCalculator,
    MaximumLikelihoodEstimator,
};
use excl_model::{build_model, counting_workspace, CountingModel, Workspace};
use std::path::PathBuf;

mod report;

use report::{AnalysisConfig, AnalysisReport, LimitStatus};

#[derive(Parser)]
#[command(name = "excl")]
#[command(about = "excl - CLs exclusion limits for counting experiments")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Human-readable console report
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Full analysis: hypothesis test at --poi-test, then an upper-limit scan
    Run {
        /// Expected signal events
        #[arg(long)]
        signal: f64,

        /// Expected background events
        #[arg(long)]
        background: f64,

        /// Absolute uncertainty on the background
        #[arg(long)]
        bkg_uncertainty: f64,

        /// Observed events
        #[arg(long)]
        observed: f64,

        /// POI value for the hypothesis test
        #[arg(long, default_value = "1.0")]
        poi_test: f64,

        /// Scan start (mu)
        #[arg(long, default_value = "0.0")]
        scan_min: f64,

        /// Scan stop (mu)
        #[arg(long, default_value = "10.0")]
        scan_max: f64,

        /// Number of scan points (inclusive)
        #[arg(long, default_value = "21")]
        scan_steps: usize,

        /// Target CLs level (alpha), typically 0.05
        #[arg(long, default_value = "0.05")]
        level: f64,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Asymptotic CLs hypotest at a single POI value
    Hypotest {
        /// Input workspace (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Tested POI value (mu)
        #[arg(long)]
        mu: f64,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scan-based CLs upper limits
    UpperLimit {
        /// Input workspace (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Target CLs level (alpha), typically 0.05
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Scan start (mu)
        #[arg(long, default_value = "0.0")]
        scan_min: f64,

        /// Scan stop (mu)
        #[arg(long, default_value = "10.0")]
        scan_max: f64,

        /// Number of scan points (inclusive)
        #[arg(long, default_value = "21")]
        scan_steps: usize,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Emit the counting-experiment workspace specification as JSON
    Spec {
        /// Expected signal events
        #[arg(long)]
        signal: f64,

        /// Expected background events
        #[arg(long)]
        background: f64,

        /// Absolute uncertainty on the background
        #[arg(long)]
        bkg_uncertainty: f64,

        /// Observed events
        #[arg(long)]
        observed: f64,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            signal,
            background,
            bkg_uncertainty,
            observed,
            poi_test,
            scan_min,
            scan_max,
            scan_steps,
            level,
            format,
            output,
        } => cmd_run(
            signal,
            background,
            bkg_uncertainty,
            observed,
            poi_test,
            scan_min,
            scan_max,
            scan_steps,
            level,
            format,
            output.as_ref(),
        ),
        Commands::Hypotest { input, mu, output } => cmd_hypotest(&input, mu, output.as_ref()),
        Commands::UpperLimit { input, alpha, scan_min, scan_max, scan_steps, output } => {
            cmd_upper_limit(&input, alpha, scan_min, scan_max, scan_steps, output.as_ref())
        }
        Commands::Spec { signal, background, bkg_uncertainty, observed, output } => {
            cmd_spec(signal, background, bkg_uncertainty, observed, output.as_ref())
        }
    }
}

fn scan_grid(scan_min: f64, scan_max: f64, scan_steps: usize) -> Result<Vec<f64>> {
    if scan_steps < 2 {
        anyhow::bail!("scan-steps must be >= 2");
    }
    if !(scan_max > scan_min) {
        anyhow::bail!("scan-max must be > scan-min");
    }
    let step = (scan_max - scan_min) / (scan_steps as f64 - 1.0);
    Ok((0..scan_steps).map(|i| scan_min + step * i as f64).collect())
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    signal: f64,
    background: f64,
    bkg_uncertainty: f64,
    observed: f64,
    poi_test: f64,
    scan_min: f64,
    scan_max: f64,
    scan_steps: usize,
    level: f64,
    format: OutputFormat,
    output: Option<&PathBuf>,
) -> Result<()> {
    let model = build_model(signal, background, bkg_uncertainty)?;
    let observations = vec![observed];
    tracing::info!(signal, background, bkg_uncertainty, observed, "model built");

    let data: Vec<f64> = observations.iter().copied().chain(model.auxdata()).collect();
    let best_fit = MaximumLikelihoodEstimator::new().fit(&model.with_observations(&data)?)?;

    let hypotest = hypothesis_test(&model, &observations, poi_test)?;
    tracing::debug!(cls = hypotest.cls, mu_hat = hypotest.mu_hat, "hypothesis test done");

    let scan = scan_grid(scan_min, scan_max, scan_steps)?;
    let (limit_status, limit) = match upper_limit(&model, &observations, &scan, level) {
        Ok(limit) => (LimitStatus::Ok, Some(limit)),
        Err(excl_core::Error::LimitOutOfRange { level, lo, hi }) => {
            tracing::warn!(level, lo, hi, "limit outside the scanned range");
            (LimitStatus::OutsideScanRange, None)
        }
        Err(e) => return Err(e.into()),
    };

    let parameters = model.parameters().iter().map(|p| p.name.clone()).collect();
    let report = AnalysisReport {
        config: AnalysisConfig {
            signal,
            background,
            bkg_uncertainty,
            observed,
            poi_test,
            scan_min,
            scan_max,
            scan_steps,
            level,
        },
        parameters,
        best_fit,
        hypotest,
        limit_status,
        upper_limit: limit,
    };

    match format {
        OutputFormat::Text => write_text(output, &report::render_text(&report)),
        OutputFormat::Json => write_json(output, serde_json::to_value(&report)?),
    }
}

fn cmd_hypotest(input: &PathBuf, mu: f64, output: Option<&PathBuf>) -> Result<()> {
    let model = load_model(input)?;
    let mle = MaximumLikelihoodEstimator::new();
    let calculator = AsymptoticCalculator::new(&mle, &model)?;
    let result = calculator.hypotest(&mle, mu)?;
    tracing::debug!(mu_test = result.mu_test, cls = result.cls, "hypotest result");

    write_json(output, serde_json::to_value(&result)?)
}

fn cmd_upper_limit(
    input: &PathBuf,
    alpha: f64,
    scan_min: f64,
    scan_max: f64,
    scan_steps: usize,
    output: Option<&PathBuf>,
) -> Result<()> {
    let scan = scan_grid(scan_min, scan_max, scan_steps)?;
    let model = load_model(input)?;
    let mle = MaximumLikelihoodEstimator::new();
    let calculator = AsymptoticCalculator::new(&mle, &model)?;
    let result = upper_limit_scan(&calculator, &mle, &scan, alpha)?;

    write_json(output, serde_json::to_value(&result)?)
}

fn cmd_spec(
    signal: f64,
    background: f64,
    bkg_uncertainty: f64,
    observed: f64,
    output: Option<&PathBuf>,
) -> Result<()> {
    let ws = counting_workspace(signal, background, bkg_uncertainty, observed)?;
    write_json(output, serde_json::to_value(&ws)?)
}

fn load_model(input: &PathBuf) -> Result<CountingModel> {
    tracing::info!(path = %input.display(), "loading workspace");
    let json = std::fs::read_to_string(input)?;
    let workspace: Workspace = serde_json::from_str(&json)?;
    let model = CountingModel::from_workspace(&workspace)?;
    tracing::info!(parameters = model.n_params(), "workspace loaded");
    Ok(model)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

fn write_text(output: Option<&PathBuf>, text: &str) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, text)?;
    } else {
        print!("{}", text);
    }
    Ok(())
}
