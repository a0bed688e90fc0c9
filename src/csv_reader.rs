use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::coords::LocalCoords;

const REQUIRED_COLUMNS: [&str; 5] = ["type", "_x", "_y", "_z", "grid_id"];

/// One placed object: a model type at a local position inside a grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
	pub kind: String,
	pub position: LocalCoords,
	pub cell: (i64, i64),
}

#[derive(Debug, Deserialize)]
struct Row {
	#[serde(rename = "type")]
	kind: String,
	#[serde(rename = "_x")]
	x: f64,
	#[serde(rename = "_y")]
	y: f64,
	#[serde(rename = "_z")]
	z: f64,
	grid_id: String,
}

/// Parses a `"{x}_{y}"` grid id.
pub fn parse_grid_id(id: &str) -> Option<(i64, i64)> {
	let (x, y) = id.trim().split_once('_')?;
	Some((x.parse().ok()?, y.parse().ok()?))
}

pub fn from_csv<R: Read>(input: R) -> Result<Vec<Instance>> {
	let mut rdr = ReaderBuilder::new().comment(Some(b'#')).from_reader(input);
	let headers = rdr.headers()?.clone();
	for column in REQUIRED_COLUMNS {
		if !headers.iter().any(|h| h.trim() == column) {
			return Err(Error::MissingColumn(column));
		}
	}

	let mut instances = Vec::new();
	for (line, result) in rdr.deserialize::<Row>().enumerate() {
		let row = match result {
			Ok(row) => row,
			Err(err) => {
				warn!("Skipping row {}: {}", line + 1, err);
				continue;
			}
		};
		let cell = match parse_grid_id(&row.grid_id) {
			Some(cell) => cell,
			None => {
				warn!("Skipping row {}: invalid grid id '{}'", line + 1, row.grid_id);
				continue;
			}
		};
		instances.push(Instance {
			kind: row.kind,
			position: LocalCoords::new(row.x, row.y, row.z),
			cell,
		});
	}
	Ok(instances)
}

pub fn read_instances(path: &Path) -> Result<Vec<Instance>> {
	from_csv(File::open(path)?)
}
