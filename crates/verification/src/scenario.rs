//! Scenario manifests
//!
//! ```yaml
//! scenarios:
//!   - name: uniform-255
//!     width: 32
//!     height: 32
//!     format: r8uint
//!     fill: 255
//!     expected: 255
//! ```

use serde::{Deserialize, Deserializer};
use std::path::Path;
use texel_harness::TexelFormat;

/// Errors raised while loading or validating a manifest
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_norway::Error),
    #[error("scenario '{scenario}': {field} value {value} does not fit {format:?} (max {max})")]
    ValueOutOfRange {
        scenario: String,
        field: &'static str,
        value: u64,
        format: TexelFormat,
        max: u32,
    },
    #[error("scenario '{scenario}': expected mismatch count {count} exceeds {texels} texels")]
    MismatchCountOutOfRange { scenario: String, count: u64, texels: u64 },
    #[error("manifest contains no scenarios")]
    Empty,
}

fn deserialize_format<'de, D>(deserializer: D) -> Result<TexelFormat, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn default_format() -> TexelFormat {
    TexelFormat::R8Uint
}

/// One identity run and its expected outcome
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_format", deserialize_with = "deserialize_format")]
    pub format: TexelFormat,
    pub fill: u64,
    pub expected: u64,
    #[serde(default)]
    pub sentinel: Option<u64>,
    /// Mismatches the run must produce to pass
    #[serde(default)]
    pub expect_mismatches: u64,
}

impl Scenario {
    /// A run whose expected value equals its fill
    pub fn uniform(name: impl Into<String>, width: u32, height: u32, format: TexelFormat, fill: u64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            fill,
            expected: fill,
            sentinel: None,
            expect_mismatches: 0,
        }
    }

    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Checks that every value fits the format
    ///
    /// Extents are left to the harness, which reports zero extents as
    /// configuration errors.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let max = self.format.max_value();
        let values = [("fill", Some(self.fill)), ("expected", Some(self.expected)), ("sentinel", self.sentinel)];
        for (field, value) in values {
            if let Some(value) = value.filter(|&v| v > max as u64) {
                return Err(ScenarioError::ValueOutOfRange {
                    scenario: self.name.clone(),
                    field,
                    value,
                    format: self.format,
                    max,
                });
            }
        }
        if self.expect_mismatches > self.texel_count() {
            return Err(ScenarioError::MismatchCountOutOfRange {
                scenario: self.name.clone(),
                count: self.expect_mismatches,
                texels: self.texel_count(),
            });
        }
        Ok(())
    }
}

/// A list of scenarios loaded from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioManifest {
    pub scenarios: Vec<Scenario>,
}

impl ScenarioManifest {
    /// Parses and validates a manifest
    pub fn from_yaml(yaml_content: &str) -> Result<Self, ScenarioError> {
        let manifest: Self = serde_norway::from_str(yaml_content)?;
        if manifest.scenarios.is_empty() {
            return Err(ScenarioError::Empty);
        }
        for scenario in &manifest.scenarios {
            scenario.validate()?;
        }
        Ok(manifest)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }
}
