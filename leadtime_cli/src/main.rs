use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use leadtime::{
    analyze, format_abs_time, format_cutoff, format_duration_minutes, format_hours,
    format_percent, parse_hours, Analysis, DistributionKind, ExplainMetrics, Incoterm, LtError,
    OrderProfile, Params, RawInputs, RecomputePolicy, Session,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shipment lead-time simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate one or more scenarios and write the service-level curve CSV
    Analyze(AnalyzeArgs),
    /// Service level for a single lead-time target
    Lookup(LookupArgs),
    /// Write the per-minute order pattern CSV
    Distribution(DistributionArgs),
    /// Best/worst-case metrics and the worst-case walkthrough as JSON
    Explain(ExplainArgs),
}

impl Command {
    fn overrides(&self) -> &OverrideArgs {
        match self {
            Command::Analyze(args) => &args.overrides,
            Command::Lookup(args) => &args.overrides,
            Command::Distribution(args) => &args.overrides,
            Command::Explain(args) => &args.overrides,
        }
    }
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Scenario JSON files (built-in defaults when none given)
    #[arg(value_hint = ValueHint::FilePath)]
    scenarios: Vec<PathBuf>,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "service_levels.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Optional CSV of per-flight traffic shares
    #[arg(long, value_hint = ValueHint::FilePath)]
    shares: Option<PathBuf>,

    /// Optional JSON report with the full analysis of every scenario
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Parser, Debug)]
struct LookupArgs {
    /// Scenario JSON file
    #[arg(value_hint = ValueHint::FilePath)]
    scenario: PathBuf,

    /// Lead-time target (H:MM or decimal hours)
    #[arg(long)]
    target: String,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Parser, Debug)]
struct DistributionArgs {
    /// Scenario JSON file
    #[arg(value_hint = ValueHint::FilePath)]
    scenario: Option<PathBuf>,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "order_pattern.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Parser, Debug)]
struct ExplainArgs {
    /// Scenario JSON file
    #[arg(value_hint = ValueHint::FilePath)]
    scenario: Option<PathBuf>,

    /// Output JSON path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[command(flatten)]
    overrides: OverrideArgs,
}

/// Flags layered over the scenario file. Durations accept H:MM or decimal hours.
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Incoterm (customs/last-mile default to its values unless set)
    #[arg(long, value_enum, ignore_case = true)]
    incoterm: Option<IncotermOpt>,

    /// Pickup after order (RFC)
    #[arg(long)]
    rfc: Option<String>,

    /// Transit to the departure terminal
    #[arg(long)]
    transit: Option<String>,

    /// Latest acceptance before departure
    #[arg(long)]
    lat: Option<String>,

    /// Flight time
    #[arg(long)]
    flight: Option<String>,

    /// Arrival processing (TOA)
    #[arg(long)]
    toa: Option<String>,

    /// Customs clearance
    #[arg(long)]
    customs: Option<String>,

    /// Last-mile delivery
    #[arg(long = "last-mile")]
    last_mile: Option<String>,

    /// Daily departures, comma separated HH:MM
    #[arg(long)]
    flights: Option<String>,

    /// Order pattern
    #[arg(long, value_enum)]
    distribution: Option<DistributionOpt>,

    /// Peak order time for the normal pattern (HH:MM)
    #[arg(long)]
    peak: Option<String>,

    /// Spread of the normal pattern in hours
    #[arg(long)]
    sigma: Option<String>,

    /// Last order time for the cutoff pattern (HH:MM)
    #[arg(long)]
    cutoff: Option<String>,

    /// Service curve step in hours
    #[arg(long)]
    resolution: Option<String>,

    /// Lead-time target reported alongside the curve
    #[arg(long)]
    lookup: Option<String>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum IncotermOpt {
    Dap,
    Dpu,
}

impl From<IncotermOpt> for Incoterm {
    fn from(value: IncotermOpt) -> Self {
        match value {
            IncotermOpt::Dap => Incoterm::Dap,
            IncotermOpt::Dpu => Incoterm::Dpu,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DistributionOpt {
    Uniform,
    Normal,
    Cutoff,
}

impl From<DistributionOpt> for DistributionKind {
    fn from(value: DistributionOpt) -> Self {
        match value {
            DistributionOpt::Uniform => DistributionKind::Uniform,
            DistributionOpt::Normal => DistributionKind::Normal,
            DistributionOpt::Cutoff => DistributionKind::Cutoff,
        }
    }
}

impl OverrideArgs {
    fn apply(&self, mut inputs: RawInputs) -> RawInputs {
        // Customs/last-mile left unset in the file follow the new incoterm.
        if let Some(incoterm) = self.incoterm {
            inputs.incoterm = Incoterm::from(incoterm).code().to_string();
        }
        if let Some(kind) = self.distribution {
            inputs.distribution = DistributionKind::from(kind).name().to_string();
        }
        let text_fields = [
            (&self.rfc, &mut inputs.rfc),
            (&self.transit, &mut inputs.transit),
            (&self.lat, &mut inputs.lat),
            (&self.flight, &mut inputs.flight),
            (&self.toa, &mut inputs.toa),
            (&self.flights, &mut inputs.flights),
            (&self.peak, &mut inputs.peak),
            (&self.sigma, &mut inputs.sigma),
            (&self.cutoff, &mut inputs.cutoff),
            (&self.resolution, &mut inputs.resolution),
            (&self.lookup, &mut inputs.lookup),
        ];
        for (flag, field) in text_fields {
            if let Some(value) = flag {
                field.clone_from(value);
            }
        }
        if let Some(customs) = &self.customs {
            inputs.customs = Some(customs.clone());
        }
        if let Some(last_mile) = &self.last_mile {
            inputs.last_mile = Some(last_mile.clone());
        }
        inputs
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.command.overrides().verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Lookup(args) => handle_lookup(args),
        Command::Distribution(args) => handle_distribution(args),
        Command::Explain(args) => handle_explain(args),
    }
}

struct ScenarioRun {
    name: String,
    analysis: Analysis,
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    scenarios: Vec<ScenarioReport<'a>>,
}

#[derive(Serialize)]
struct ScenarioReport<'a> {
    name: &'a str,
    analysis: &'a Analysis,
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let sources: Vec<Option<PathBuf>> = if args.scenarios.is_empty() {
        vec![None]
    } else {
        args.scenarios.iter().cloned().map(Some).collect()
    };

    let t_run = Instant::now();
    let runs = sources
        .par_iter()
        .map(|path| -> Result<ScenarioRun> {
            let name = scenario_name(path.as_deref());
            let inputs = args.overrides.apply(load_scenario(path.as_deref())?);
            let params = validate_inputs(&name, &inputs)?;
            let analysis = analyze(&params).map_err(|err| run_failure(&name, err))?;
            Ok(ScenarioRun { name, analysis })
        })
        .collect::<Result<Vec<_>>>()?;
    if args.overrides.verbose {
        info!(
            "Simulation stage: {:.1} ms ({} scenarios)",
            t_run.elapsed().as_secs_f64() * 1000.0,
            runs.len()
        );
    }

    for run in &runs {
        log_summary(&run.name, &run.analysis);
    }

    let t_csv = Instant::now();
    let mut writer = csv_writer(&args.output)?;
    write_curve_rows(&runs, &mut writer)?;
    if args.overrides.verbose {
        info!(
            "CSV stage: {:.1} ms",
            t_csv.elapsed().as_secs_f64() * 1000.0
        );
    }
    if args.output.as_os_str() != "-" {
        info!("Wrote service-level CSV: {}", args.output.display());
    }

    if let Some(path) = args.shares.as_ref() {
        let mut writer = csv_writer(path)?;
        write_share_rows(&runs, &mut writer)?;
        info!("Wrote flight shares: {}", path.display());
    }

    if let Some(path) = args.report.as_ref() {
        write_report(&runs, path)?;
        info!("Wrote report: {}", path.display());
    }
    Ok(())
}

fn handle_lookup(args: LookupArgs) -> Result<()> {
    let target_h = parse_hours(&args.target)
        .filter(|t| *t >= 0.0)
        .ok_or_else(|| anyhow!("--target: Use HH:MM (24h) or a number ≥ 0."))?;

    let name = scenario_name(Some(&args.scenario));
    let inputs = lookup_inputs(&args)?;
    let mut session = Session::new(inputs, RecomputePolicy::OnDemand);
    session
        .calculate()
        .map_err(|err| run_failure(&name, err))?;
    let pct = session
        .lookup_service_pct()
        .ok_or_else(|| anyhow!("{name}: no result for target {}", args.target))?;

    info!(
        "{name}: {} of orders delivered within {}",
        format_percent(pct),
        format_hours(target_h)
    );
    let mut out = io::stdout().lock();
    writeln!(out, "{pct:.4}")?;
    Ok(())
}

/// Scenario inputs with `--target` standing in for the file's lookup.
fn lookup_inputs(args: &LookupArgs) -> Result<RawInputs> {
    let mut inputs = args.overrides.apply(load_scenario(Some(&args.scenario))?);
    inputs.lookup.clone_from(&args.target);
    Ok(inputs)
}

fn handle_distribution(args: DistributionArgs) -> Result<()> {
    let name = scenario_name(args.scenario.as_deref());
    let inputs = args.overrides.apply(load_scenario(args.scenario.as_deref())?);
    let profile = OrderProfile::preview(&inputs).ok_or_else(|| {
        anyhow!(
            "{name}: cannot build the '{}' order pattern from the given inputs",
            inputs.distribution
        )
    })?;
    debug!("{name}: order pattern total weight {:.12}", profile.total());

    let mut writer = csv_writer(&args.output)?;
    writer.write_record(["minute", "time", "weight"])?;
    for (minute, weight) in profile.iter() {
        writer.write_record([minute.get().to_string(), minute.to_string(), weight.to_string()])?;
    }
    writer.flush()?;
    if args.output.as_os_str() != "-" {
        info!("Wrote order pattern: {}", args.output.display());
    }
    Ok(())
}

fn handle_explain(args: ExplainArgs) -> Result<()> {
    let name = scenario_name(args.scenario.as_deref());
    let inputs = args.overrides.apply(load_scenario(args.scenario.as_deref())?);
    let params = validate_inputs(&name, &inputs)?;
    let analysis = analyze(&params).map_err(|err| run_failure(&name, err))?;
    log_explain(&name, &analysis.explain);

    if args.output.as_os_str() == "-" {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &analysis.explain)?;
        writeln!(out)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        serde_json::to_writer_pretty(file, &analysis.explain)?;
        info!("Wrote explain metrics: {}", args.output.display());
    }
    Ok(())
}

fn scenario_name(path: Option<&Path>) -> String {
    path.and_then(|p| p.file_stem())
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "default".to_string())
}

fn load_scenario(path: Option<&Path>) -> Result<RawInputs> {
    let Some(path) = path else {
        return Ok(RawInputs::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    RawInputs::from_json_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn validate_inputs(name: &str, inputs: &RawInputs) -> Result<Params> {
    inputs.validate().map_err(|err| run_failure(name, err))
}

/// Logs each field error on its own line before folding into one error.
fn run_failure(name: &str, err: LtError) -> anyhow::Error {
    match err {
        LtError::Validation(errors) => {
            for field_error in errors.errors() {
                warn!("{name}: {field_error}");
            }
            anyhow!("{name}: {} invalid input(s)", errors.errors().len())
        }
        other => anyhow::Error::new(other).context(format!("{name}: simulation failed")),
    }
}

fn log_summary(name: &str, analysis: &Analysis) {
    let explain = &analysis.explain;
    let quantile = |q: Option<f64>| q.map(format_hours).unwrap_or_else(|| "n/a".into());
    info!(
        "{name}: mean {}, p50 {}, p95 {}, best {} at {}, worst {} at {}",
        format_hours(explain.mean_lead_h),
        quantile(explain.p50_lead_h),
        quantile(explain.p95_lead_h),
        format_hours(explain.best_lead_h),
        explain.best_minute,
        format_hours(explain.worst_lead_h),
        explain.worst_minute
    );
    info!(
        "{name}: {} of orders within {}",
        format_percent(analysis.lookup_service_pct),
        format_hours(analysis.params.lookup_h)
    );
    debug!(
        "{name}: {} curve points, {} next-day",
        analysis.service_curve.points.len(),
        format_percent(analysis.flight_shares.next_day_pct)
    );
}

fn log_explain(name: &str, explain: &ExplainMetrics) {
    for cutoff in &explain.cutoffs {
        info!(
            "{name}: to catch the {} flight order by {}",
            cutoff.departure,
            format_cutoff(cutoff.cutoff_tod_min)
        );
    }
    info!(
        "{name}: busiest flight {} ({}), {} leave on a later day",
        explain.top_flight,
        format_percent(explain.top_flight_share * 100.0),
        format_percent(explain.next_day_share * 100.0)
    );

    let story = &explain.narrative;
    let missed = story
        .missed
        .map(|missed| {
            format!(
                ", {} after the {} acceptance closed at {}",
                format_duration_minutes(missed.late_by_clamped_min()),
                format_abs_time(missed.departure.abs_minute as f64),
                format_abs_time(missed.acceptance_close_abs_min)
            )
        })
        .unwrap_or_default();
    info!(
        "{name}: worst case orders at {}, reaches the terminal at {}{missed}; waits {} for {}",
        story.order_minute,
        format_abs_time(story.terminal_abs_min),
        format_duration_minutes(story.wait_clamped_min()),
        format_abs_time(story.chosen_departure.abs_minute as f64)
    );
}

fn csv_writer(path: &Path) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = if path.as_os_str() == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )
    };
    Ok(csv::Writer::from_writer(sink))
}

fn write_curve_rows<W: Write>(runs: &[ScenarioRun], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["scenario", "target_h", "service_pct"])?;
    for run in runs {
        for point in &run.analysis.service_curve.points {
            writer.write_record([
                run.name.clone(),
                format!("{:.3}", point.target_h),
                format!("{:.4}", point.service_pct),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_share_rows<W: Write>(runs: &[ScenarioRun], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["scenario", "flight", "share_pct"])?;
    for run in runs {
        for (label, pct) in run.analysis.flight_shares.bars() {
            writer.write_record([run.name.as_str(), label, format!("{pct:.4}").as_str()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_report(runs: &[ScenarioRun], path: &Path) -> Result<()> {
    let report = Report {
        generated_at: Utc::now().to_rfc3339(),
        scenarios: runs
            .iter()
            .map(|run| ScenarioReport {
                name: &run.name,
                analysis: &run.analysis,
            })
            .collect(),
    };
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &report)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
