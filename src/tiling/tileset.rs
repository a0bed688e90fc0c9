use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::bounds::Box3;
use crate::model::coords::GpsCoords;
use crate::model::vector3::Vector3;

pub const TILESET_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
	pub asset: Asset,
	pub geometric_error: f64,
	pub root: TileElement,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Asset {
	pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Refine {
	Add,
	Replace,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Content {
	pub uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
	Box,
	Region,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BoundingVolume {
	/// Center followed by the three half axes.
	Box([f64; 12]),
	/// West, east, south, north (radians), min and max height (metres).
	Region([f64; 6]),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TileElement {
	pub geometric_error: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refine: Option<Refine>,
	pub bounding_volume: BoundingVolume,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transform: Option<[f64; 16]>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub children: Option<Vec<TileElement>>,
}

impl BoundingVolume {
	/// Oriented box for a Y-up mesh box, expressed Z-up.
	pub fn from_mesh_box(b: &Box3) -> BoundingVolume {
		let c = b.center();
		BoundingVolume::Box([
			c.x,
			-c.z,
			c.y,
			b.width() / 2.0,
			0.0,
			0.0,
			0.0,
			-b.depth() / 2.0,
			0.0,
			0.0,
			0.0,
			b.height() / 2.0,
		])
	}

	/// Axis aligned box given directly in the tileset frame.
	pub fn from_local_box(b: &Box3) -> BoundingVolume {
		let c = b.center();
		let [hx, hy, hz] = b.half_extents();
		BoundingVolume::Box([c.x, c.y, c.z, hx, 0.0, 0.0, 0.0, hy, 0.0, 0.0, 0.0, hz])
	}

	pub fn region(reference: &GpsCoords, local: &Box3) -> BoundingVolume {
		BoundingVolume::Region(reference.region_from_local(local))
	}

	pub fn kind(&self) -> VolumeKind {
		match self {
			BoundingVolume::Box(_) => VolumeKind::Box,
			BoundingVolume::Region(_) => VolumeKind::Region,
		}
	}

	/// Axis aligned box in metres enclosing the volume. Regions are placed
	/// relative to `reference`.
	pub fn local_box(&self, reference: &GpsCoords) -> Box3 {
		match self {
			BoundingVolume::Box(b) => {
				let center = Vector3::new(b[0], b[1], b[2]);
				let extent = Vector3::new(
					b[3].abs() + b[6].abs() + b[9].abs(),
					b[4].abs() + b[7].abs() + b[10].abs(),
					b[5].abs() + b[8].abs() + b[11].abs(),
				);
				Box3 {
					min: center - extent,
					max: center + extent,
				}
			}
			BoundingVolume::Region(r) => reference.local_from_region(r),
		}
	}

	pub fn half_extents(&self, reference: &GpsCoords) -> [f64; 3] {
		self.local_box(reference).half_extents()
	}

	/// True when `other` lies within this volume, allowing `eps` metres of slack.
	pub fn contains(&self, other: &BoundingVolume, reference: &GpsCoords, eps: f64) -> bool {
		self.local_box(reference)
			.contains(&other.local_box(reference), eps)
	}
}

impl Tileset {
	pub fn new(root: TileElement) -> Tileset {
		Tileset {
			asset: Asset {
				version: TILESET_VERSION.to_string(),
			},
			geometric_error: root.geometric_error,
			root,
		}
	}

	/// The single volume kind used by the whole tree.
	pub fn volume_kind(&self) -> Result<VolumeKind> {
		let kind = self.root.bounding_volume.kind();
		let mut stack = vec![&self.root];
		while let Some(element) = stack.pop() {
			if element.bounding_volume.kind() != kind {
				return Err(Error::MixedBoundingVolumes);
			}
			if let Some(children) = &element.children {
				stack.extend(children.iter());
			}
		}
		Ok(kind)
	}
}

impl TileElement {
	pub fn new(geometric_error: f64, refine: Refine, bounding_volume: BoundingVolume) -> TileElement {
		TileElement {
			geometric_error,
			refine: Some(refine),
			bounding_volume,
			transform: None,
			content: None,
			children: None,
		}
	}

	pub fn with_content(mut self, uri: impl Into<String>) -> TileElement {
		self.content = Some(Content { uri: uri.into() });
		self
	}

	pub fn with_transform(mut self, transform: Option<[f64; 16]>) -> TileElement {
		self.transform = transform;
		self
	}

	pub fn add_child(&mut self, child: TileElement) {
		self.children.get_or_insert_with(Vec::new).push(child);
	}

	/// Replaces empty children lists with none, recursively.
	pub fn prune_children(&mut self) {
		if let Some(children) = &mut self.children {
			for child in children.iter_mut() {
				child.prune_children();
			}
			if children.is_empty() {
				self.children = None;
			}
		}
	}
}

/// Writes `tileset` to the file `dest`, creating parent folders.
pub fn write_tileset(tileset: &Tileset, dest: &Path) -> Result<PathBuf> {
	tileset.volume_kind()?;
	let mut tileset = tileset.clone();
	tileset.root.prune_children();

	if let Some(parent) = dest.parent() {
		fs::create_dir_all(parent)?;
	}
	let file = File::create(dest)?;
	serde_json::to_writer(BufWriter::new(file), &tileset)?;
	Ok(dest.to_path_buf())
}

pub fn read_tileset(path: &Path) -> Result<Tileset> {
	let file = File::open(path)?;
	Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
	use super::{
		read_tileset, write_tileset, BoundingVolume, Refine, TileElement, Tileset, VolumeKind,
	};
	use crate::error::Error;
	use crate::model::bounds::Box3;
	use crate::model::coords::GpsCoords;

	fn sample() -> Tileset {
		let mut root = TileElement::new(
			120.0,
			Refine::Add,
			BoundingVolume::from_mesh_box(&Box3::new(0.0, 0.0, 0.0, 4.0, 2.0, 6.0)),
		)
		.with_transform(Some(GpsCoords::default().to_ecef_transform()));
		root.add_child(
			TileElement::new(
				0.0,
				Refine::Replace,
				BoundingVolume::from_mesh_box(&Box3::new(0.0, 0.0, 0.0, 2.0, 2.0, 6.0)),
			)
			.with_content("LOD-0/0_0.b3dm"),
		);
		Tileset::new(root)
	}

	#[test]
	fn oriented_box_swaps_to_z_up() {
		let volume = BoundingVolume::from_mesh_box(&Box3::new(0.0, 0.0, 0.0, 4.0, 2.0, 6.0));
		assert_eq!(
			volume,
			BoundingVolume::Box([2.0, -3.0, 1.0, 2.0, 0.0, 0.0, 0.0, -3.0, 0.0, 0.0, 0.0, 1.0])
		);
		let local = volume.local_box(&GpsCoords::default());
		assert_eq!(local, Box3::new(0.0, -6.0, 0.0, 4.0, 0.0, 2.0));
	}

	#[test]
	fn serializes_schema_names_and_skips_absent_fields() {
		let json = serde_json::to_value(sample()).unwrap();
		assert_eq!(json["asset"]["version"], "1.0");
		assert_eq!(json["geometricError"], 120.0);
		assert_eq!(json["root"]["refine"], "ADD");
		assert_eq!(json["root"]["boundingVolume"]["box"].as_array().unwrap().len(), 12);
		assert_eq!(json["root"]["transform"].as_array().unwrap().len(), 16);

		let child = &json["root"]["children"][0];
		assert_eq!(child["refine"], "REPLACE");
		assert_eq!(child["content"]["uri"], "LOD-0/0_0.b3dm");
		let keys: Vec<&String> = child.as_object().unwrap().keys().collect();
		assert!(!keys.iter().any(|k| *k == "transform" || *k == "children"));
	}

	#[test]
	fn round_trips_through_file() -> Result<(), Box<dyn std::error::Error>> {
		let dir = tempfile::tempdir()?;
		let tileset = sample();
		let path = write_tileset(&tileset, &dir.path().join("nested/tileset.json"))?;
		assert_eq!(read_tileset(&path)?, tileset);
		Ok(())
	}

	#[test]
	fn prunes_empty_children() {
		let mut root = TileElement::new(1.0, Refine::Add, BoundingVolume::Region([0.0; 6]));
		root.children = Some(vec![TileElement {
			children: Some(Vec::new()),
			..TileElement::new(0.5, Refine::Add, BoundingVolume::Region([0.0; 6]))
		}]);
		root.prune_children();
		assert_eq!(root.children.as_ref().unwrap()[0].children, None);

		let mut empty = TileElement::new(1.0, Refine::Add, BoundingVolume::Region([0.0; 6]));
		empty.children = Some(Vec::new());
		empty.prune_children();
		assert!(empty.children.is_none());
	}

	#[test]
	fn rejects_mixed_volume_kinds() {
		let mut tileset = sample();
		assert_eq!(tileset.volume_kind().unwrap(), VolumeKind::Box);
		tileset
			.root
			.add_child(TileElement::new(0.0, Refine::Add, BoundingVolume::Region([0.0; 6])));
		let dir = tempfile::tempdir().unwrap();
		let result = write_tileset(&tileset, &dir.path().join("tileset.json"));
		assert!(matches!(result, Err(Error::MixedBoundingVolumes)));
	}

	#[test]
	fn region_contains_inner_region() {
		let reference = GpsCoords::default();
		let outer = BoundingVolume::region(&reference, &Box3::new(-10.0, -10.0, 0.0, 10.0, 10.0, 5.0));
		let inner = BoundingVolume::region(&reference, &Box3::new(-2.0, 1.0, 1.0, 3.0, 4.0, 2.0));
		assert!(outer.contains(&inner, &reference, 1e-6));
		assert!(!inner.contains(&outer, &reference, 1e-6));
	}
}
