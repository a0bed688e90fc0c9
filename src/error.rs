use std::path::PathBuf;

use thiserror::Error;

/// Result type for conversion stages
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting geometry into tilesets
#[derive(Error, Debug)]
pub enum Error {
	#[error("Invalid input: {0}")]
	InvalidInput(String),

	#[error("Unsupported input file: {0}")]
	UnsupportedInput(PathBuf),

	#[error("Malformed mesh '{mesh}': {reason}")]
	MalformedMesh { mesh: String, reason: String },

	#[error("OBJ parse error at line {line}: {reason}")]
	Obj { line: usize, reason: String },

	#[error("CSV file is missing required column '{0}'")]
	MissingColumn(&'static str),

	#[error("Tileset mixes box and region bounding volumes")]
	MixedBoundingVolumes,

	#[error("Split of {lod} failed: {reason}")]
	Split { lod: String, reason: String },

	#[error("Validator failed: {0}")]
	Validator(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("CSV error: {0}")]
	Csv(#[from] csv::Error),
}

impl Error {
	pub fn malformed(mesh: &str, reason: impl Into<String>) -> Self {
		Error::MalformedMesh {
			mesh: mesh.to_string(),
			reason: reason.into(),
		}
	}
}

/// Non-fatal problem found while assembling a tile tree.
///
/// These are answered with a fallback (skipped term, absolute transform)
/// and reported to the caller instead of aborting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyIssue {
	#[error("Tile {tile} LOD {lod}: reference {axis} dimension is zero, term skipped")]
	ZeroReferenceDimension { tile: String, lod: usize, axis: char },

	#[error("Tile {tile} of level {level} has no parent, transform is absolute")]
	ParentNotFound { tile: String, level: usize },

	#[error("Tile {tile} of level {level} has no center")]
	MissingCenter { tile: String, level: usize },

	#[error("Tile {tile}: could not read {path}")]
	UnreadableContent { tile: String, path: PathBuf },
}
