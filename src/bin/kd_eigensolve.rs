//! Command-line driver computing the lowest eigenpairs of `M†M` for a
//! Kähler-Dirac preconditioned staggered operator.
//!
//! The gauge field is generated from a seed (random or cold start), the solver
//! parameters come from an optional JSON file with command-line overrides, and
//! one CSV row per eigenpair is written to the output file.
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use kd_jacdav::{
    config::{BlockPreconditioning, EigenParam, KdParam},
    dirac::{DiracMatrix, MatrixKind, StaggeredKdDirac},
    field::{FieldGeometry, Precision, SpinorField},
    lattice::GaugeField,
    solvers::eigensolve,
    utils::perf::peak_rss_kb,
};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};

/// Storage precision selectable from the command line.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum PrecisionArg {
    Half,
    Single,
    Double,
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Half => Precision::Half,
            PrecisionArg::Single => Precision::Single,
            PrecisionArg::Double => Precision::Double,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderingArg {
    Left,
    Right,
}

#[derive(Parser, Debug)]
#[clap(
    name = "kd-eigensolve",
    about = "Computes the lowest eigenpairs of M†M for the Kähler-Dirac staggered operator."
)]
struct Args {
    /// Lattice extents, e.g. `4,4,4,8`. Every extent must be even.
    #[clap(long, value_delimiter = ',', default_values_t = [4, 4, 4, 4])]
    dims: Vec<usize>,
    /// Bare quark mass.
    #[clap(long, default_value_t = 0.1)]
    mass: f64,
    /// Seed of the random gauge field.
    #[clap(long, default_value_t = 42)]
    gauge_seed: u64,
    /// Use a unit gauge field instead of a random one.
    #[clap(long)]
    cold_start: bool,
    #[clap(long, value_enum, default_value_t = PrecisionArg::Double)]
    precision: PrecisionArg,
    /// Precision of the block inverse; defaults to the gauge precision.
    #[clap(long, value_enum)]
    xinv_precision: Option<PrecisionArg>,
    #[clap(long, value_enum, default_value_t = OrderingArg::Left)]
    block_preconditioning: OrderingArg,
    /// JSON file with the eigensolver parameters.
    #[clap(long, value_name = "PATH")]
    param: Option<PathBuf>,
    /// Overrides `n_conv` of the parameter file.
    #[clap(long)]
    n_conv: Option<usize>,
    /// Overrides `tol` of the parameter file.
    #[clap(long)]
    tol: Option<f64>,
    /// Save the converged eigenvectors to this CSV file.
    #[clap(long, value_name = "PATH")]
    vec_outfile: Option<PathBuf>,
    /// Path to the output CSV file with one row per eigenpair.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// One row of the output CSV.
#[derive(Debug, Serialize)]
struct EigenSummary {
    index: usize,
    eigenvalue: f64,
    residual: f64,
    converged: bool,
    restarts: usize,
    iterations: usize,
    time_s: f64,
    gflops: f64,
    rss_kb: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = Args::parse();
    let dims: [usize; 4] = args
        .dims
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("Expected 4 lattice extents, got {:?}", args.dims))?;

    let mut param = match &args.param {
        Some(path) => EigenParam::from_json_file(path)
            .with_context(|| format!("Failed to read eigensolver parameters from {path:?}"))?,
        None => EigenParam::default(),
    };
    if let Some(n_conv) = args.n_conv {
        param.n_conv = n_conv;
    }
    if let Some(tol) = args.tol {
        param.tol = tol;
    }
    if args.vec_outfile.is_some() {
        param.vec_outfile = args.vec_outfile.clone();
    }

    let precision = Precision::from(args.precision);
    let gauge = if args.cold_start {
        GaugeField::cold_start(dims, precision)
    } else {
        GaugeField::random(dims, precision, args.gauge_seed)
    };
    log::info!(
        "Gauge field {dims:?} ({}), mass = {}",
        if args.cold_start { "cold start" } else { "random" },
        args.mass
    );

    let kd_param = KdParam {
        mass: args.mass,
        xinv_precision: args.xinv_precision.map(Precision::from),
        block_preconditioning: match args.block_preconditioning {
            OrderingArg::Left => BlockPreconditioning::Left,
            OrderingArg::Right => BlockPreconditioning::Right,
        },
    };
    let kd = StaggeredKdDirac::new(Arc::new(gauge), &kd_param)
        .context("Failed to build the Kähler-Dirac operator")?;
    let mdag_m = DiracMatrix::new(&kd, MatrixKind::MdagM);

    let geometry = FieldGeometry::staggered(dims, 1, 3, precision);
    let initial = SpinorField::random(&geometry, param.seed);
    let result = eigensolve(&mdag_m, &initial, &param)?;
    log::info!(
        "{} eigenpairs ({}converged), {}",
        result.evals.len(),
        if result.converged { "" } else { "not " },
        result.perf
    );

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create CSV writer for {:?}", &args.output))?;
    let rss_kb = peak_rss_kb();
    for (index, (&eigenvalue, &residual)) in result
        .evals
        .iter()
        .zip(&result.residuals)
        .enumerate()
    {
        writer.serialize(EigenSummary {
            index,
            eigenvalue,
            residual,
            converged: result.converged,
            restarts: result.restarts,
            iterations: result.iterations,
            time_s: result.perf.seconds,
            gflops: result.perf.gflops(),
            rss_kb,
        })?;
    }
    writer.flush()?;
    log::info!("Results written to {:?}", args.output);
    Ok(())
}
