use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use runviz::{
    bin_activity, normalize_activity, parse_activity_records, point_radii, process_run_file,
    summarize, ManifestBuilder, NormalizeParams, NormalizedRun, Params, ResizePolicy,
    SceneBuilder, SceneManifest,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run sculpture geometry CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the scene manifest for a normalized run record
    Build(BuildArgs),
    /// Convert a FIT/GPX activity into a normalized run record
    Normalize(NormalizeArgs),
}

#[derive(Parser, Debug)]
struct BuildArgs {
    /// Run record JSON
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output manifest path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Optional per-point CSV of the derived series
    #[arg(long, value_hint = ValueHint::FilePath)]
    series: Option<PathBuf>,

    /// Params JSON to start from instead of the defaults
    #[arg(long, value_hint = ValueHint::FilePath)]
    params: Option<PathBuf>,

    /// Altitude multiplier (0.01 is real scale)
    #[arg(long)]
    vertical_scale: Option<f64>,

    /// Largest footprint a run could theoretically reach
    #[arg(long)]
    obj_max: Option<f64>,

    /// Upper bound of the display envelope
    #[arg(long)]
    scale_max: Option<f64>,

    /// Footprint resize policy
    #[arg(long, value_enum)]
    resize: Option<ResizeOpt>,

    /// Exponent for the power-law resize policy (default 0.92)
    #[arg(long)]
    exponent: Option<f64>,

    /// First line of the engraved text
    #[arg(long)]
    label: Option<String>,

    /// Drop samples closer than this to an already kept sample (record units)
    #[arg(long)]
    min_spacing: Option<f64>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct NormalizeArgs {
    /// FIT/GPX activity file
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output run record path (`-` for stdout)
    #[arg(short, long, default_value = "run.json", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Bin length in seconds
    #[arg(long, default_value_t = 300.0)]
    interval: f64,

    /// Drop samples closer than this many metres to an already kept sample
    #[arg(long)]
    min_spacing: Option<f64>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ResizeOpt {
    Linear,
    Log,
    Power,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Build(args) => args.verbose,
        Command::Normalize(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Build(args) => handle_build(args),
        Command::Normalize(args) => handle_normalize(args),
    }
}

const DEFAULT_POWER_EXPONENT: f64 = 0.92;

fn build_params(args: &BuildArgs) -> Result<Params> {
    let params = match args.params.as_ref() {
        Some(path) => load_params(path)?,
        None => Params::default(),
    };
    let params = apply_overrides(params, args);
    params.validate()?;
    Ok(params)
}

/// Layer command line flags over params loaded from a file or the defaults.
fn apply_overrides(mut params: Params, args: &BuildArgs) -> Params {
    if let Some(v) = args.vertical_scale {
        params.vertical_scale = v;
    }
    if let Some(v) = args.obj_max {
        params.obj_max = v;
    }
    if let Some(label) = args.label.as_ref() {
        params.label = label.clone();
    }
    if args.min_spacing.is_some() {
        params.min_point_spacing = args.min_spacing;
    }
    if let Some(opt) = args.resize {
        params.resize_policy = match opt {
            ResizeOpt::Linear => ResizePolicy::Linear,
            ResizeOpt::Log => ResizePolicy::Logarithmic {
                max_size: params.scale_max,
            },
            ResizeOpt::Power => ResizePolicy::PowerLaw {
                min_size: 1.0,
                max_size: params.scale_max,
                exponent: DEFAULT_POWER_EXPONENT,
            },
        };
    }
    if let Some(v) = args.scale_max {
        params.scale_max = v;
        params.resize_policy = params.resize_policy.with_max_size(v);
    }
    if let Some(exponent) = args.exponent {
        match params.resize_policy.with_exponent(exponent) {
            Some(policy) => params.resize_policy = policy,
            None => warn!(
                "--exponent {} ignored: only the power-law resize policy uses it",
                exponent
            ),
        }
    }
    params
}

fn load_params(path: &Path) -> Result<Params> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn handle_build(args: BuildArgs) -> Result<()> {
    let params = build_params(&args)?;
    debug!("Params: {:?}", params);

    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let run = process_run_file(&data, &params)
        .with_context(|| format!("failed to ingest {}", args.input.display()))?;
    let summary = summarize(&run)?;
    info!(
        "Run summary: {:.2} km, {:.0} m gain, {:.1} min/km, peak {:.3}",
        summary.total_distance, summary.total_gain, summary.average_pace, summary.highest_point
    );

    let manifest = ManifestBuilder::new(&params, &run.paces).build_scene(
        &run.points,
        &run.widths,
        &summary,
    )?;
    info!(
        "Footprint {:.2} x {:.2} fitted to {:.2} x {:.2}",
        manifest.body.footprint.0,
        manifest.body.footprint.1,
        manifest.body.resized_footprint.0,
        manifest.body.resized_footprint.1
    );

    write_manifest(&manifest, &args.output)?;

    if let Some(path) = args.series.as_ref() {
        write_series_csv(&run, &params, path)?;
        info!("Wrote series CSV: {}", path.display());
    }
    Ok(())
}

fn write_manifest(manifest: &SceneManifest, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(manifest)?;
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(text.as_bytes())?;
        handle.write_all(b"\n")?;
    } else {
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote scene manifest: {}", path.display());
    }
    Ok(())
}

fn write_series_csv(run: &NormalizedRun, params: &Params, path: &Path) -> Result<()> {
    let radii = point_radii(&run.points, &run.widths, params.base_radius)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record([
        "index",
        "x",
        "y",
        "z",
        "width",
        "radius",
        "pace",
        "altitude",
        "real_distance",
    ])?;
    for (i, point) in run.points.iter().enumerate() {
        writer.write_record(&[
            i.to_string(),
            format!("{:.6}", point.x),
            format!("{:.6}", point.y),
            format!("{:.6}", point.z),
            format!("{}", run.widths[i]),
            format!("{:.6}", radii[i].radius),
            format!("{}", run.paces[i]),
            format!("{}", run.altitudes[i]),
            format!("{}", run.real_distances[i]),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_normalize(args: NormalizeArgs) -> Result<()> {
    let params = NormalizeParams {
        interval_s: args.interval,
        min_point_spacing: args.min_spacing,
        ..NormalizeParams::default()
    };

    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let hint = args
        .input
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| anyhow!("{} has no file extension", args.input.display()))?;
    let records = parse_activity_records(&data, hint)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    if records.iter().all(|r| r.hr.is_none()) {
        warn!(
            "{} carries no heart rate; the tube will have a constant width",
            args.input.display()
        );
    }

    let bins = bin_activity(&records, params.interval_s)?;
    let record = normalize_activity(&bins, &params)?;
    info!(
        "Normalized {} records into {} samples ({:.2} km)",
        records.len(),
        record.norm_points.len(),
        record.ttl_distance
    );

    let text = record.to_json_pretty()?;
    if args.output.as_os_str() == "-" {
        println!("{text}");
    } else {
        fs::write(&args.output, text)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Wrote run record: {}", args.output.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_args(flags: &[&str]) -> BuildArgs {
        let mut argv = vec!["runviz", "build", "run.json"];
        argv.extend_from_slice(flags);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Build(args) => args,
            Command::Normalize(_) => panic!("expected build args"),
        }
    }

    #[test]
    fn scale_max_reaches_loaded_policy() {
        let loaded = Params {
            resize_policy: ResizePolicy::Logarithmic { max_size: 100.0 },
            ..Params::default()
        };
        let params = apply_overrides(loaded, &build_args(&["--scale-max", "40"]));
        assert_eq!(params.scale_max, 40.0);
        assert_eq!(
            params.resize_policy,
            ResizePolicy::Logarithmic { max_size: 40.0 }
        );
    }

    #[test]
    fn exponent_reaches_loaded_power_policy() {
        let loaded = Params {
            resize_policy: ResizePolicy::PowerLaw {
                min_size: 1.0,
                max_size: 100.0,
                exponent: 0.5,
            },
            ..Params::default()
        };
        let params = apply_overrides(loaded, &build_args(&["--exponent", "0.8"]));
        assert_eq!(
            params.resize_policy,
            ResizePolicy::PowerLaw {
                min_size: 1.0,
                max_size: 100.0,
                exponent: 0.8,
            }
        );
    }

    #[test]
    fn resize_flag_builds_power_policy_with_overrides() {
        let params = apply_overrides(
            Params::default(),
            &build_args(&["--resize", "power", "--scale-max", "80"]),
        );
        assert_eq!(
            params.resize_policy,
            ResizePolicy::PowerLaw {
                min_size: 1.0,
                max_size: 80.0,
                exponent: DEFAULT_POWER_EXPONENT,
            }
        );
    }

    #[test]
    fn exponent_without_power_policy_leaves_policy_alone() {
        let params = apply_overrides(Params::default(), &build_args(&["--exponent", "0.8"]));
        assert_eq!(params.resize_policy, ResizePolicy::Linear);
    }
}
