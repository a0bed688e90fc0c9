use std::collections::HashMap;

use crate::error::{AssemblyIssue, Error, Result};
use crate::model::bounds::Box3;
use crate::tiling::tileset::{BoundingVolume, Refine, TileElement, Tileset};

pub const BASE_ERROR: f64 = 100.0;

pub struct MeshPyramid {
	pub tileset: Tileset,
	pub issues: Vec<AssemblyIssue>,
}

/// Geometric error of a LOD box measured against the LOD0 box of the same
/// leaf. Axes where the reference has no extent are skipped and reported.
pub fn geometric_error(
	name: &str,
	lod: usize,
	current: &Box3,
	reference: &Box3,
	issues: &mut Vec<AssemblyIssue>,
) -> f64 {
	if lod == 0 {
		return 0.0;
	}
	let dims = [
		('x', current.width(), reference.width()),
		('y', current.height(), reference.height()),
		('z', current.depth(), reference.depth()),
	];
	let mut base = 0.0;
	for (axis, value, ref_value) in dims {
		if ref_value == 0.0 {
			issues.push(AssemblyIssue::ZeroReferenceDimension {
				tile: name.to_string(),
				lod,
				axis,
			});
			continue;
		}
		base += (value - ref_value).abs() / ref_value + 1.0;
	}
	base.powi(lod as i32)
}

/// Nests one element per LOD for every LOD0 leaf, coarsest first, under a
/// single additive root.
pub fn build_mesh_pyramid(
	level_boxes: &[HashMap<String, Box3>],
	transform: Option<[f64; 16]>,
) -> Result<MeshPyramid> {
	let lod0 = level_boxes
		.first()
		.filter(|boxes| !boxes.is_empty())
		.ok_or_else(|| Error::InvalidInput("no LOD0 tiles to assemble".to_string()))?;

	let mut names: Vec<&String> = lod0.keys().collect();
	names.sort();

	let mut issues = Vec::new();
	let mut global: Option<Box3> = None;
	let mut children = Vec::with_capacity(names.len());

	for name in names {
		let reference = lod0[name];
		let mut chain: Vec<TileElement> = Vec::new();

		for lod in (0..level_boxes.len()).rev() {
			let own = match level_boxes[lod].get(name) {
				Some(b) => *b,
				None => continue,
			};
			global = Some(global.map_or(own, |g| g.union(&own)));

			let volume = level_boxes[..lod]
				.iter()
				.filter_map(|boxes| boxes.get(name))
				.fold(own, |acc, b| acc.union(b));

			let mut error = geometric_error(name, lod, &own, &reference, &mut issues);
			if let Some(parent) = chain.last() {
				error = error.min(parent.geometric_error);
			}

			chain.push(
				TileElement::new(error, Refine::Replace, BoundingVolume::from_mesh_box(&volume))
					.with_content(format!("LOD-{}/{}.b3dm", lod, name)),
			);
		}

		let mut finest = match chain.pop() {
			Some(element) => element,
			None => continue,
		};
		while let Some(mut parent) = chain.pop() {
			parent.add_child(finest);
			finest = parent;
		}
		children.push(finest);
	}

	let global = global.ok_or_else(|| Error::InvalidInput("no tile bounds".to_string()))?;
	let root_error = children
		.iter()
		.map(|c| c.geometric_error)
		.fold(BASE_ERROR, f64::max);

	let mut root = TileElement::new(root_error, Refine::Add, BoundingVolume::from_mesh_box(&global))
		.with_transform(transform);
	for child in children {
		root.add_child(child);
	}
	root.prune_children();

	Ok(MeshPyramid {
		tileset: Tileset::new(root),
		issues,
	})
}
