//! Runs scenarios against a device

use crate::scenario::Scenario;
use texel_harness::{GpuContext, Harness, IdentityRun, Kernel, RunReport, Texel, TexelFormat};

/// Result of running one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub report: RunReport,
    pub expected_mismatches: u64,
}

impl ScenarioOutcome {
    /// Whether the run produced exactly the expected number of mismatches
    pub fn passed(&self) -> bool {
        self.report.mismatches == self.expected_mismatches
    }
}

fn identity_run<T: Texel>(scenario: &Scenario, convert: impl Fn(u64) -> T) -> IdentityRun<T> {
    IdentityRun {
        width: scenario.width,
        height: scenario.height,
        fill: convert(scenario.fill),
        expected: convert(scenario.expected),
        sentinel: scenario.sentinel.map(&convert),
    }
}

/// Validates `scenario` and runs it with the identity kernel for its format
pub fn run_scenario(context: &GpuContext, scenario: &Scenario) -> Result<ScenarioOutcome, Box<dyn std::error::Error>> {
    scenario.validate()?;

    let kernel = Kernel::identity(scenario.format)?;
    let harness = Harness::new(context, &kernel);

    // Values are range-checked above, so the narrowing casts are exact.
    let report = match scenario.format {
        TexelFormat::R8Uint => harness.run_identity(&identity_run(scenario, |v| v as u8))?,
        TexelFormat::R32Uint => harness.run_identity(&identity_run(scenario, |v| v as u32))?,
    };

    Ok(ScenarioOutcome {
        name: scenario.name.clone(),
        report,
        expected_mismatches: scenario.expect_mismatches,
    })
}
