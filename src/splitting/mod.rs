pub mod clip;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::bounds::Box3;
use crate::model::mesh::Mesh;
use crate::model::options::{SplitPointStrategy, MAX_DIVISIONS};
use crate::model::vector3::Vector3;
use crate::obj_reader;
use crate::pipeline::PipelineContext;
use crate::writer;

pub struct SplitOutput {
	pub leaves: BTreeMap<String, Mesh>,
	pub edge_splits: usize,
}

struct Piece {
	mesh: Mesh,
	coord: [i64; 3],
	bounds: Option<Box3>,
}

fn leaf_name(coord: &[i64; 3], z_split: bool) -> String {
	if z_split {
		format!("{}_{}_{}", coord[0], coord[1], coord[2])
	} else {
		format!("{}_{}", coord[0], coord[1])
	}
}

fn split_point(piece: &Piece, axis: usize, strategy: SplitPointStrategy) -> Option<f64> {
	let point: Vector3 = match (&piece.bounds, strategy) {
		(Some(bounds), _) => bounds.center(),
		(None, SplitPointStrategy::AbsoluteCenter) => piece.mesh.bounds()?.center(),
		(None, SplitPointStrategy::VertexBaricenter) => piece.mesh.barycenter()?,
	};
	Some(point.get(axis))
}

/// Partitions a mesh into a grid of leaves. At each level the pieces are
/// cut along x, then y, then z when `z_split` is set. With `bounds` every
/// cut goes through the center of the current bounds so that meshes sharing
/// the bounds are cut on the same planes.
pub fn split(
	mut mesh: Mesh,
	division_depth: usize,
	z_split: bool,
	bounds: Option<Box3>,
	strategy: SplitPointStrategy,
) -> Result<SplitOutput> {
	mesh.validate()?;
	if division_depth > MAX_DIVISIONS {
		return Err(Error::InvalidInput(format!(
			"division depth {} exceeds {}",
			division_depth, MAX_DIVISIONS
		)));
	}

	let axes: &[usize] = if z_split { &[0, 1, 2] } else { &[0, 1] };
	let mut leaves = BTreeMap::new();
	let mut edge_splits = 0;
	let mut queue = VecDeque::new();
	queue.push_back((
		Piece {
			mesh,
			coord: [0, 0, 0],
			bounds,
		},
		0,
	));

	while let Some((piece, depth)) = queue.pop_front() {
		if depth == division_depth {
			let mut mesh = piece.mesh;
			mesh.compact();
			mesh.name = leaf_name(&piece.coord, z_split);
			leaves.insert(mesh.name.clone(), mesh);
			continue;
		}

		let mut pieces = vec![piece];
		for &axis in axes {
			let mut next = Vec::with_capacity(pieces.len() * 2);
			for piece in pieces {
				let q = match split_point(&piece, axis, strategy) {
					Some(q) => q,
					None => continue,
				};
				let result = clip::clip(&piece.mesh, axis, q);
				edge_splits += result.edge_splits;

				let (lower, upper) = match &piece.bounds {
					Some(b) => {
						let (l, u) = b.split_at(axis, q);
						(Some(l), Some(u))
					}
					None => (None, None),
				};
				for (side, child, child_bounds) in
					[(0, result.left, lower), (1, result.right, upper)]
				{
					if let Some(mesh) = child {
						let mut coord = piece.coord;
						coord[axis] = coord[axis] * 2 + side;
						next.push(Piece {
							mesh,
							coord,
							bounds: child_bounds,
						});
					}
				}
			}
			pieces = next;
		}
		queue.extend(pieces.into_iter().map(|p| (p, depth + 1)));
	}

	Ok(SplitOutput { leaves, edge_splits })
}

/// Loads `source`, splits it and writes every leaf as `{dest}/{name}.obj`.
/// Returns the bounds of each written leaf.
pub fn split_file(
	ctx: &PipelineContext,
	source: &Path,
	dest: &Path,
	division_depth: usize,
	z_split: bool,
	bounds: Option<Box3>,
	strategy: SplitPointStrategy,
) -> Result<HashMap<String, Box3>> {
	fs::create_dir_all(dest)?;

	info!("[{}] Loading OBJ file {}", ctx.run_id, source.display());
	let start = Instant::now();
	let mesh = obj_reader::load_mesh(source)?;
	info!(
		"[{}] Loaded {} vertices, {} faces in {}ms",
		ctx.run_id,
		mesh.vertices.len(),
		mesh.triangle_count(),
		start.elapsed().as_millis()
	);

	let source_dir = source.parent().unwrap_or_else(|| Path::new("."));
	obj_reader::copy_dependencies(&mesh, source_dir, dest)?;

	let start = Instant::now();
	let output = split(mesh, division_depth, z_split, bounds, strategy)?;
	info!(
		"[{}] Done {} edge splits into {} tiles in {}ms",
		ctx.run_id,
		output.edge_splits,
		output.leaves.len(),
		start.elapsed().as_millis()
	);

	output
		.leaves
		.par_iter()
		.map(|(name, mesh)| -> Result<(String, Box3)> {
			writer::write_obj(mesh, &dest.join(format!("{}.obj", name)))?;
			let bounds = mesh
				.bounds()
				.ok_or_else(|| Error::malformed(name, "leaf has no vertices"))?;
			Ok((name.clone(), bounds))
		})
		.collect()
}

/// Splits every LOD file into `{dest_root}/LOD-{index}` in parallel. A
/// failing LOD is logged and reported as an error in its slot.
pub fn split_lods(
	ctx: &PipelineContext,
	sources: &[PathBuf],
	dest_root: &Path,
	bounds: Option<Box3>,
) -> Vec<Result<HashMap<String, Box3>>> {
	let options = &ctx.options;
	let bounds = match options.split_point {
		Some(_) => None,
		None => bounds,
	};
	sources
		.par_iter()
		.enumerate()
		.map(|(lod, source)| {
			let dest = dest_root.join(format!("LOD-{}", lod));
			let result = split_file(
				ctx,
				source,
				&dest,
				options.divisions,
				options.z_split,
				bounds,
				options.split_point.unwrap_or_default(),
			);
			if let Err(err) = &result {
				warn!("[{}] Split of LOD {} failed: {}", ctx.run_id, lod, err);
			}
			result
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::{split, split_lods};
	use crate::model::bounds::Box3;
	use crate::model::mesh::tests::unit_cube;
	use crate::model::mesh::{Mesh, SubMesh};
	use crate::model::options::{Options, SplitPointStrategy};
	use crate::model::vector3::Vector3;
	use crate::pipeline::PipelineContext;
	use crate::writer::write_obj;
	use approx::assert_relative_eq;

	#[test]
	fn unit_cube_splits_into_quadrants() {
		let cube = unit_cube();
		let input_bounds = cube.bounds().unwrap();
		let output = split(cube, 1, false, None, SplitPointStrategy::AbsoluteCenter).unwrap();

		let names: Vec<&String> = output.leaves.keys().collect();
		assert_eq!(names, vec!["0_0", "0_1", "1_0", "1_1"]);

		let mut union: Option<Box3> = None;
		for leaf in output.leaves.values() {
			let b = leaf.bounds().unwrap();
			assert_relative_eq!(b.width(), 0.5);
			assert_relative_eq!(b.height(), 0.5);
			assert_relative_eq!(b.depth(), 1.0);
			leaf.validate().unwrap();
			union = Some(union.map_or(b, |u| u.union(&b)));
		}
		assert_eq!(union.unwrap(), input_bounds);

		let lower_left = &output.leaves["0_0"].bounds().unwrap();
		assert_relative_eq!(lower_left.max.x, 0.5);
		assert_relative_eq!(lower_left.max.y, 0.5);
	}

	#[test]
	fn splitting_conserves_area() {
		let cube = unit_cube();
		let output = split(cube, 2, true, None, SplitPointStrategy::VertexBaricenter).unwrap();
		let total: f64 = output.leaves.values().map(|m| m.area()).sum();
		assert_relative_eq!(total, 6.0, epsilon = 1e-9);
		assert!(output.leaves.keys().all(|n| n.split('_').count() == 3));
	}

	#[test]
	fn mesh_inside_one_cell_is_untouched() {
		let mut mesh = Mesh::new("corner");
		mesh.vertices = vec![
			Vector3::new(0.1, 0.1, 0.0),
			Vector3::new(0.2, 0.1, 0.0),
			Vector3::new(0.1, 0.2, 0.0),
		];
		mesh.submeshes = vec![SubMesh {
			indices: vec![0, 1, 2],
			material: None,
		}];
		let bounds = Box3::new(0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
		let output = split(mesh.clone(), 1, false, Some(bounds), SplitPointStrategy::default()).unwrap();

		assert_eq!(output.edge_splits, 0);
		assert_eq!(output.leaves.len(), 1);
		let leaf = &output.leaves["0_0"];
		assert_eq!(leaf.vertices, mesh.vertices);
		assert_eq!(leaf.submeshes, mesh.submeshes);
	}

	#[test]
	fn names_are_stable_across_runs() {
		let a = split(unit_cube(), 2, false, None, SplitPointStrategy::default()).unwrap();
		let b = split(unit_cube(), 2, false, None, SplitPointStrategy::default()).unwrap();
		assert_eq!(a.leaves.keys().collect::<Vec<_>>(), b.leaves.keys().collect::<Vec<_>>());
		assert_eq!(a.leaves.len(), 16);
		for (name, leaf) in &a.leaves {
			assert_eq!(leaf.bounds(), b.leaves[name].bounds());
		}
	}

	#[test]
	fn depth_zero_writes_the_mesh_whole() {
		let mut cube = unit_cube();
		cube.vertices.push(Vector3::new(5.0, 5.0, 5.0));
		let output = split(cube, 0, false, None, SplitPointStrategy::default()).unwrap();
		let leaf = &output.leaves["0_0"];
		assert_eq!(leaf.vertices.len(), 8);
		assert_eq!(leaf.bounds().unwrap().max.x, 1.0);
	}

	#[test]
	fn failed_lod_is_isolated() -> Result<(), Box<dyn std::error::Error>> {
		let dir = tempfile::tempdir()?;
		let good = dir.path().join("lod0.obj");
		write_obj(&unit_cube(), &good)?;
		let bad = dir.path().join("lod1.obj");
		std::fs::write(&bad, "v 0 0 0\nf 1 2 3\n")?;

		let mut options = Options::new(good.clone(), dir.path().join("out"));
		options.divisions = 1;
		let ctx = PipelineContext::new(options);
		let results = split_lods(&ctx, &[good, bad], &dir.path().join("out"), None);

		let lod0 = results[0].as_ref().unwrap();
		assert_eq!(lod0.len(), 4);
		assert!(dir.path().join("out/LOD-0/1_1.obj").exists());
		assert!(results[1].is_err());
		Ok(())
	}
}
