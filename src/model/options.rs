use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::model::coords::GpsCoords;

pub const MAX_DIVISIONS: usize = 10;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SplitPointStrategy {
	AbsoluteCenter,
	#[default]
	VertexBaricenter,
}

#[derive(Debug, Clone)]
pub struct Options {
	pub input: PathBuf,
	pub output: PathBuf,
	pub lods: usize,
	pub divisions: usize,
	pub z_split: bool,
	pub coords: Option<GpsCoords>,
	pub keep_intermediate: bool,
	pub use_system_temp: bool,
	/// Split point rule for every LOD. None cuts all LODs on the center of
	/// the shared LOD0 bounds.
	pub split_point: Option<SplitPointStrategy>,
	/// Model file per instance type, for CSV input.
	pub models: HashMap<String, PathBuf>,
	pub validate: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputKind {
	Obj,
	Csv,
}

impl Options {
	pub fn new(input: PathBuf, output: PathBuf) -> Options {
		Options {
			input,
			output,
			lods: 3,
			divisions: 2,
			z_split: false,
			coords: None,
			keep_intermediate: false,
			use_system_temp: false,
			split_point: None,
			models: HashMap::new(),
			validate: false,
		}
	}

	pub fn input_kind(&self) -> Result<InputKind> {
		let ext = self
			.input
			.extension()
			.and_then(|e| e.to_str())
			.map(|e| e.to_ascii_lowercase());
		match ext.as_deref() {
			Some("obj") => Ok(InputKind::Obj),
			Some("csv") => Ok(InputKind::Csv),
			_ => Err(Error::UnsupportedInput(self.input.clone())),
		}
	}

	/// Checks the run configuration before any tile work starts.
	pub fn validate(&self) -> Result<InputKind> {
		if self.lods < 1 {
			return Err(Error::InvalidInput("lods must be at least 1".to_string()));
		}
		if self.divisions > MAX_DIVISIONS {
			return Err(Error::InvalidInput(format!(
				"divisions must be between 0 and {}",
				MAX_DIVISIONS
			)));
		}
		if !self.input.exists() {
			return Err(Error::InvalidInput(format!(
				"input file {} does not exist",
				self.input.display()
			)));
		}
		let kind = self.input_kind()?;
		if kind == InputKind::Csv {
			for (kind, path) in &self.models {
				if !path.exists() {
					return Err(Error::InvalidInput(format!(
						"model for '{}' not found at {}",
						kind,
						path.display()
					)));
				}
			}
		}
		Ok(kind)
	}
}

/// Parses `type=path` pairs separated by commas.
pub fn parse_models(value: &str) -> Result<HashMap<String, PathBuf>> {
	let mut models = HashMap::new();
	for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
		match pair.split_once('=') {
			Some((kind, path)) if !kind.trim().is_empty() && !path.trim().is_empty() => {
				models.insert(kind.trim().to_string(), PathBuf::from(path.trim()));
			}
			_ => {
				return Err(Error::InvalidInput(format!(
					"model mapping '{}' is not of the form type=path",
					pair
				)))
			}
		}
	}
	Ok(models)
}
