use std::path::Path;
use std::process::Command;

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ValidationReport {
	#[serde(rename = "numErrors", default)]
	pub errors: usize,
	#[serde(rename = "numWarnings", default)]
	pub warnings: usize,
}

pub trait TilesetValidator {
	fn validate(&self, path: &Path) -> Result<ValidationReport>;
}

/// Runs the 3D Tiles validator through `npx`.
pub struct NpxValidator {
	pub program: String,
}

impl Default for NpxValidator {
	fn default() -> Self {
		NpxValidator {
			program: "npx".to_string(),
		}
	}
}

/// Picks the JSON report out of the validator output, which may be
/// preceded by npm progress lines.
pub fn parse_report(output: &str) -> Result<ValidationReport> {
	let start = output
		.find('{')
		.ok_or_else(|| Error::Validator("no report in validator output".to_string()))?;
	let end = output
		.rfind('}')
		.filter(|&end| end > start)
		.ok_or_else(|| Error::Validator("unterminated validator report".to_string()))?;
	Ok(serde_json::from_str(&output[start..=end])?)
}

impl TilesetValidator for NpxValidator {
	fn validate(&self, path: &Path) -> Result<ValidationReport> {
		let output = Command::new(&self.program)
			.args(["--yes", "3d-tiles-validator", "--tilesetFile"])
			.arg(path)
			.output()
			.map_err(|err| Error::Validator(format!("could not run {}: {}", self.program, err)))?;
		let stdout = String::from_utf8_lossy(&output.stdout);
		debug!("Validator output: {}", stdout);
		parse_report(&stdout)
	}
}

#[cfg(test)]
mod tests {
	use super::{parse_report, NpxValidator, TilesetValidator, ValidationReport};
	use std::path::Path;

	#[test]
	fn parses_counts_after_noise() {
		let output = "npm WARN exec\n{\"date\":\"x\",\"numErrors\":2,\"numWarnings\":1,\"issues\":[{}]}\n";
		assert_eq!(
			parse_report(output).unwrap(),
			ValidationReport {
				errors: 2,
				warnings: 1
			}
		);
		assert_eq!(parse_report("{}").unwrap(), ValidationReport::default());
	}

	#[test]
	fn garbage_is_an_error() {
		assert!(parse_report("command not found").is_err());
		assert!(parse_report("} {").is_err());
	}

	#[test]
	fn missing_program_is_an_error() {
		let validator = NpxValidator {
			program: "definitely-not-a-validator-binary".to_string(),
		};
		assert!(validator.validate(Path::new("tileset.json")).is_err());
	}
}
