//! Identity kernel verification binary
//!
//! Fills an input image, runs the identity kernel into an output image and
//! prints how many output texels differ from the expected value. Runs either a
//! single scenario described by flags or every scenario in a YAML manifest.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use texel_harness::{ContextOptions, GpuContext, SyncPolicy, TexelFormat};
use texel_harness_verification::{
    runner::run_scenario,
    scenario::{Scenario, ScenarioManifest},
};

#[derive(Parser)]
#[command(version, about = "Dispatches the identity kernel and counts mismatching texels")]
struct Args {
    /// YAML manifest of scenarios; overrides the single-run flags
    #[arg(long, short)]
    manifest: Option<PathBuf>,

    #[arg(long, default_value_t = 32)]
    width: u32,

    #[arg(long, default_value_t = 32)]
    height: u32,

    /// Texel format (r8uint, r32uint)
    #[arg(long, short, default_value = "r8uint")]
    format: TexelFormat,

    /// Value the input image is filled with
    #[arg(long, default_value_t = 255)]
    fill: u64,

    /// Value every output texel is compared against
    #[arg(long, short, default_value_t = 255)]
    expected: u64,

    /// Value the output image holds before dispatch
    #[arg(long)]
    sentinel: Option<u64>,

    /// Give up waiting for the device after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use a software fallback adapter
    #[arg(long)]
    fallback_adapter: bool,

    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let scenarios = match &args.manifest {
        Some(path) => ScenarioManifest::from_file(path)?.scenarios,
        None => vec![Scenario {
            expected: args.expected,
            sentinel: args.sentinel,
            ..Scenario::uniform("command line", args.width, args.height, args.format, args.fill)
        }],
    };

    let context = GpuContext::new(ContextOptions {
        force_fallback_adapter: args.fallback_adapter,
        sync: SyncPolicy {
            timeout: args.timeout_ms.map(std::time::Duration::from_millis),
            cancel: None,
        },
        ..Default::default()
    })
    .await?;

    let mut failures = 0;
    for scenario in &scenarios {
        if !context.supports_read_write_storage(scenario.format) {
            tracing::warn!(scenario = %scenario.name, format = ?scenario.format, "adapter cannot write this format from a kernel");
        }

        match run_scenario(&context, scenario) {
            Ok(outcome) => {
                let mark = if outcome.passed() { "✓" } else { "✗" };
                println!(
                    "{mark} {}: {} mismatches of {} texels (expected {})",
                    outcome.name,
                    outcome.report.mismatches,
                    outcome.report.texel_count(),
                    outcome.expected_mismatches
                );
                if !outcome.passed() {
                    failures += 1;
                }
            }
            Err(e) => {
                eprintln!("✗ {}: {e}", scenario.name);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        eprintln!("{failures} of {} scenarios failed", scenarios.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
