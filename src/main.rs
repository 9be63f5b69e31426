//! dsp48-emu: DSP48E1 slice and tensor tile emulator

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use dsp48_emu::config::Config;
use dsp48_emu::fmul::fmul;
use dsp48_emu::tensor::{self_test, Matrix, MatrixMut, PipelineConfig, TensorUnit};

/// Operand pairs for the `fmul` sample table.
const FMUL_SAMPLES: [(f32, f32); 11] = [
    (1.0, 2.0),
    (1.5, 2.5),
    (2.5, -4.0),
    (3.75, 0.75),
    (0.5, -0.5),
    (10.0, -3.0),
    (-1.5, 5.25),
    (-2.25, 8.0),
    (100.0, 0.0001),
    (0.00123, -200.0),
    (100.0, 0.0001),
];

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();

    // Parse options; everything else is the command and its operands
    let mut config_path: Option<PathBuf> = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config_path = Some(PathBuf::from(path));
        } else if arg == "--help" || arg == "-h" {
            print_usage();
            return Ok(());
        } else {
            rest.push(arg.as_str());
        }
    }

    let config = match &config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::get().clone(),
    };

    match rest.as_slice() {
        [] | ["self-test"] => run_self_test(),
        ["fmul"] => run_fmul_table(),
        ["fmul", a, b] => run_fmul_pair(parse_float(a)?, parse_float(b)?),
        ["gemm", rows, cols, depth] => run_gemm(
            &config.pipeline_config(),
            parse_dim(rows)?,
            parse_dim(cols)?,
            parse_dim(depth)?,
        ),
        ["config"] => {
            print_config(&config);
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unrecognised arguments: {}", rest.join(" "));
        }
    }
}

fn print_usage() {
    println!("Usage: dsp48-emu [--config <path>] <command>");
    println!();
    println!("Commands:");
    println!("  self-test                 Run the built-in 2x2x3 GEMM check (default)");
    println!("  fmul [a b]                FP32 multiply through the slice");
    println!("  gemm <rows> <cols> <depth>  Deterministic GEMM against a scalar reference");
    println!("  config                    Show the effective pipeline configuration");
}

fn parse_float(s: &str) -> anyhow::Result<f32> {
    s.parse().with_context(|| format!("invalid float operand: {}", s))
}

fn parse_dim(s: &str) -> anyhow::Result<usize> {
    s.parse().with_context(|| format!("invalid dimension: {}", s))
}

fn run_self_test() -> anyhow::Result<()> {
    let dst = self_test().context("self test failed")?;
    println!("Self test passed");
    println!("  [{:>8.2} {:>8.2}]", dst[0], dst[1]);
    println!("  [{:>8.2} {:>8.2}]", dst[2], dst[3]);
    Ok(())
}

fn run_fmul_table() -> anyhow::Result<()> {
    println!("=== DSP48E1 Float Multiply Test ===");
    println!();
    let mut mismatches = 0;
    for (i, (a, b)) in FMUL_SAMPLES.iter().enumerate() {
        println!("Test {}:", i);
        if !print_fmul(*a, *b) {
            mismatches += 1;
        }
        println!("----------------------------------------------------");
    }
    if mismatches > 0 {
        bail!("{} of {} products differ from a*b", mismatches, FMUL_SAMPLES.len());
    }
    Ok(())
}

fn run_fmul_pair(a: f32, b: f32) -> anyhow::Result<()> {
    if !print_fmul(a, b) {
        bail!("slice product differs from a*b");
    }
    Ok(())
}

/// Print one product; true when the slice matches `a * b` bit for bit.
fn print_fmul(a: f32, b: f32) -> bool {
    let reference = a * b;
    let result = fmul(a, b);
    println!("         a = {:<14e} (0x{:08X})", a, a.to_bits());
    println!("         b = {:<14e} (0x{:08X})", b, b.to_bits());
    println!("   ref=a*b = {:<14e} (0x{:08X})", reference, reference.to_bits());
    println!("     slice = {:<14e} (0x{:08X})", result, result.to_bits());
    let matches =
        result.to_bits() == reference.to_bits() || (result.is_nan() && reference.is_nan());
    if !matches {
        println!("  MISMATCH");
    }
    matches
}

fn run_gemm(pipeline: &PipelineConfig, rows: usize, cols: usize, depth: usize) -> anyhow::Result<()> {
    let mut unit = TensorUnit::new(*pipeline, rows, cols, depth)
        .with_context(|| format!("cannot build {}x{}x{} tile", rows, cols, depth))?;

    // Small exact integers keep the reference independent of summation order
    let lhs: Vec<f32> = (0..rows * depth).map(|i| ((i * 7) % 11) as f32 - 5.0).collect();
    let rhs: Vec<f32> = (0..depth * cols).map(|i| ((i * 5) % 9) as f32 - 4.0).collect();
    let bias: Vec<f32> = (0..cols).map(|c| c as f32 * 0.25).collect();
    let mut dst = vec![0.0f32; rows * cols];

    unit.gemm(
        Matrix::new(&lhs, depth),
        Matrix::new(&rhs, cols),
        Some(bias.as_slice()),
        MatrixMut::new(&mut dst, cols),
    )?;

    let mut worst = 0.0f32;
    for row in 0..rows {
        let mut line = String::new();
        for col in 0..cols {
            let mut expected = bias[col];
            for k in 0..depth {
                expected += lhs[row * depth + k] * rhs[k * cols + col];
            }
            if pipeline.enable_rounding {
                expected = expected.round_ties_even();
            }
            let got = dst[row * cols + col];
            worst = worst.max((got - expected).abs());
            line.push_str(&format!(" {:>9.2}", got));
        }
        println!("[{} ]", line);
    }

    println!();
    println!("Cycles: {}", unit.cycle());
    println!("Max abs error vs scalar reference: {}", worst);
    if worst > 1e-4 {
        bail!("GEMM result differs from the scalar reference");
    }
    Ok(())
}

fn print_config(config: &Config) {
    let pipeline = config.pipeline_config();
    println!("Effective pipeline configuration");
    println!("================================");
    println!("  format:              {}", pipeline.format.kind);
    println!("  multiplier_latency:  {}", pipeline.multiplier_latency);
    println!("  adder_latency:       {}", pipeline.adder_latency);
    println!("  accumulator_latency: {}", pipeline.accumulator_latency);
    println!("  rounding_latency:    {}", pipeline.rounding_latency);
    println!("  saturation_latency:  {}", pipeline.saturation_latency);
    println!("  total latency:       {} cycles", pipeline.total_latency());
    println!("  enable_rounding:     {}", pipeline.enable_rounding);
    println!("  enable_saturation:   {}", pipeline.enable_saturation);
    println!();
    if let Some(path) = Config::user_config_path() {
        println!("User config file: {}", path.display());
    }
    println!();
    println!("Sample config:");
    print!("{}", Config::sample_config());
}
