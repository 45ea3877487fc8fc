//! `ultra-ctl`: build and inspect Winograd control streams.
//!
//! Usage:
//!   ultra-ctl compile --n 1 --c 16 --k 16 --h 56 --w 56 --pad-h 1 --pad-w 1 -o out/
//!   ultra-ctl inspect out/control.bin

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use ultra_ctl::codegen::generate_module;
use ultra_ctl::solver::{self, ComputeUnitNotice, ConvProblem, Direction, TuningConfig};
use ultra_ctl::ControlBuffer;

const ENV_HELP: &str = "Environment:
  RUST_LOG=debug         Show record counts and kernel arguments
  ULTRA_CTL_PERF_VALS    Override tuning, e.g. \"60\" or \"60,2\"";

/// Control-stream compiler for the tiled Winograd F(2x2, 3x3) kernel
#[derive(Parser)]
#[command(name = "ultra-ctl")]
#[command(version, about, long_about = None)]
#[command(after_help = ENV_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a convolution into control.bin + control.rs
    ///
    /// Output size defaults to a 3x3 unit-stride filter: H + 2*pad - 2.
    Compile {
        /// Batch size
        #[arg(long, default_value = "1")]
        n: u32,

        /// Input channels
        #[arg(long, default_value = "1")]
        c: u32,

        /// Output channels
        #[arg(long, default_value = "1")]
        k: u32,

        /// Input height
        #[arg(long)]
        h: u32,

        /// Input width
        #[arg(long)]
        w: u32,

        /// Output height
        #[arg(long)]
        out_h: Option<u32>,

        /// Output width
        #[arg(long)]
        out_w: Option<u32>,

        /// Filter height
        #[arg(long, default_value = "3")]
        r: u32,

        /// Filter width
        #[arg(long, default_value = "3")]
        s: u32,

        /// Top padding
        #[arg(long, default_value = "0")]
        pad_h: u32,

        /// Left padding
        #[arg(long, default_value = "0")]
        pad_w: u32,

        /// Element size in bytes
        #[arg(long, default_value = "2")]
        elem_bytes: u32,

        /// Compute units on the target device
        #[arg(long, default_value = "40")]
        compute_units: u32,

        /// Worker groups (default: one per compute unit)
        #[arg(long)]
        groups: Option<u32>,

        /// Record interleave factor
        #[arg(long, default_value = "1")]
        interleave: u32,

        /// Convolution direction
        #[arg(long, value_enum, default_value = "forward")]
        direction: DirectionArg,

        /// Ignore ULTRA_CTL_PERF_VALS
        #[arg(long)]
        no_env: bool,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Decode a control.bin and print one line per record
    Inspect {
        /// Path to control.bin
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Forward,
    BackwardData,
    BackwardWeights,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Forward => Direction::Forward,
            DirectionArg::BackwardData => Direction::BackwardData,
            DirectionArg::BackwardWeights => Direction::BackwardWeights,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile {
            n,
            c,
            k,
            h,
            w,
            out_h,
            out_w,
            r,
            s,
            pad_h,
            pad_w,
            elem_bytes,
            compute_units,
            groups,
            interleave,
            direction,
            no_env,
            out,
        } => {
            let problem = ConvProblem {
                n,
                c,
                k,
                h,
                w,
                out_h: out_h.unwrap_or_else(|| output_extent("height", h, pad_h, r)),
                out_w: out_w.unwrap_or_else(|| output_extent("width", w, pad_w, s)),
                r,
                s,
                pad_h,
                pad_w,
                elem_bytes,
            };
            let mut config = match groups {
                Some(groups) => TuningConfig::new(groups, interleave),
                None => TuningConfig {
                    interleave,
                    ..TuningConfig::heuristic(compute_units)
                },
            };
            if !no_env {
                config = config.with_env_override(compute_units);
            }
            cmd_compile(&problem, &config, direction.into(), compute_units, &out);
        }
        Commands::Inspect { path } => cmd_inspect(&path),
    }
}

/// Output extent of a unit-stride convolution padded on both sides, or
/// `None` when it does not fit in `u32`.
fn same_extent(input: u32, pad: u32, filter: u32) -> Option<u32> {
    let extent = (input as u64 + 2 * pad as u64 + 1).saturating_sub(filter as u64);
    u32::try_from(extent).ok()
}

fn output_extent(axis: &str, input: u32, pad: u32, filter: u32) -> u32 {
    same_extent(input, pad, filter).unwrap_or_else(|| {
        eprintln!("error: output {axis} of {input} + 2*{pad} padding overflows u32");
        process::exit(1);
    })
}

// ---------------------------------------------------------------------------
// compile
// ---------------------------------------------------------------------------

fn cmd_compile(
    problem: &ConvProblem,
    config: &TuningConfig,
    direction: Direction,
    compute_units: u32,
    out_dir: &Path,
) {
    let mut notice = ComputeUnitNotice::new();
    notice.check(compute_units);

    if !config.is_valid(compute_units) {
        eprintln!("error: tuning {config} is not valid for {compute_units} compute units");
        process::exit(1);
    }

    let plan = solver::plan(problem, config, direction).unwrap_or_else(|err| {
        eprintln!("error: {err}");
        process::exit(1);
    });
    let generated = generate_module(&plan);

    if let Err(err) = fs::create_dir_all(out_dir) {
        eprintln!("error: creating {}: {err}", out_dir.display());
        process::exit(1);
    }

    let blob_path = out_dir.join(&generated.data_path);
    if let Err(err) = fs::write(&blob_path, &generated.data_bytes) {
        eprintln!("error: writing {}: {err}", blob_path.display());
        process::exit(1);
    }

    let syntax_tree = syn::parse2::<syn::File>(generated.tokens).unwrap_or_else(|err| {
        eprintln!("error: generated module does not parse: {err}");
        process::exit(1);
    });
    let formatted = prettyplease::unparse(&syntax_tree);

    let module_path = out_dir.join("control.rs");
    if let Err(err) = fs::write(&module_path, formatted) {
        eprintln!("error: writing {}: {err}", module_path.display());
        process::exit(1);
    }

    eprintln!(
        "Generated {} and {} ({} records, {} groups, interleave {})",
        module_path.display(),
        blob_path.display(),
        plan.args.works,
        config.groups,
        config.interleave
    );
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

fn cmd_inspect(path: &Path) {
    let bytes = fs::read(path).unwrap_or_else(|err| {
        eprintln!("error: reading {}: {err}", path.display());
        process::exit(1);
    });
    let buffer = ControlBuffer::from_le_bytes(&bytes).unwrap_or_else(|err| {
        eprintln!("error: {err}");
        process::exit(1);
    });

    if buffer.is_empty() {
        eprintln!("0 records");
        return;
    }

    println!(
        "{:>6} {:>6} {:>12} {:>12} {:>18} {:>18} {:>6} {:>8} {:>8}",
        "block", "tag", "load", "store", "row_wrap", "batch_wrap", "lanes", "in_clip", "out_clip"
    );
    for (i, record) in buffer.decode().iter().enumerate() {
        let (input_clipped, output_clipped) = record.clipped_cells();
        println!(
            "{:>6} {:>6} {:>12} {:>12} {:#018x} {:#018x} {:>6} {:>8} {:>8}",
            i,
            record.tag,
            record.load_offset,
            record.store_offset,
            record.row_wrap,
            record.batch_wrap,
            record.active_lanes(),
            input_clipped,
            output_clipped
        );
    }
    eprintln!("{} records", buffer.record_count());
}
