use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::bounds::Box3;
use crate::model::mesh::{Mesh, SubMesh};
use crate::obj_reader;
use crate::writer;

pub struct DecimateResult {
	/// One file per LOD, finest first.
	pub dest_files: Vec<PathBuf>,
	pub bounds: Box3,
}

pub trait Decimator: Sync {
	fn decimate(&self, input: &Path, dest_folder: &Path, lod_count: usize) -> Result<DecimateResult>;
}

/// Vertex clustering on a regular grid. LOD 0 is the input mesh, every
/// further LOD halves the grid resolution.
pub struct ClusteringDecimator {
	pub base_resolution: usize,
}

impl Default for ClusteringDecimator {
	fn default() -> Self {
		ClusteringDecimator { base_resolution: 256 }
	}
}

impl ClusteringDecimator {
	fn cells_for_lod(&self, lod: usize) -> usize {
		(self.base_resolution >> (lod.saturating_sub(1)).min(63)).max(1)
	}

	/// Merges all vertices falling into the same cell onto the first one
	/// seen and drops triangles that collapse.
	pub fn cluster(&self, mesh: &Mesh, cells: usize) -> Mesh {
		let bounds = match mesh.bounds() {
			Some(b) => b,
			None => return mesh.clone(),
		};
		let longest = bounds.width().max(bounds.height()).max(bounds.depth());
		if longest <= 0.0 {
			return mesh.clone();
		}
		let cell = longest / cells as f64;

		let mut representative: HashMap<(i64, i64, i64), usize> = HashMap::new();
		let remap: Vec<usize> = mesh
			.vertices
			.iter()
			.enumerate()
			.map(|(i, v)| {
				let key = (
					((v.x - bounds.min.x) / cell).floor() as i64,
					((v.y - bounds.min.y) / cell).floor() as i64,
					((v.z - bounds.min.z) / cell).floor() as i64,
				);
				*representative.entry(key).or_insert(i)
			})
			.collect();

		let mut out = mesh.clone();
		out.submeshes = mesh
			.submeshes
			.iter()
			.map(|s| SubMesh {
				indices: s
					.indices
					.chunks(3)
					.map(|t| [remap[t[0]], remap[t[1]], remap[t[2]]])
					.filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
					.flatten()
					.collect(),
				material: s.material.clone(),
			})
			.collect();
		out.compact();
		out
	}
}

impl Decimator for ClusteringDecimator {
	fn decimate(&self, input: &Path, dest_folder: &Path, lod_count: usize) -> Result<DecimateResult> {
		fs::create_dir_all(dest_folder)?;
		let mesh = obj_reader::load_mesh(input)?;
		let bounds = mesh
			.bounds()
			.ok_or_else(|| Error::malformed(&mesh.name, "mesh has no vertices"))?;
		let source_dir = input.parent().unwrap_or_else(|| Path::new("."));
		obj_reader::copy_dependencies(&mesh, source_dir, dest_folder)?;

		let dest_files = (0..lod_count)
			.into_par_iter()
			.map(|lod| -> Result<PathBuf> {
				let dest = dest_folder.join(format!("{}_{}.obj", mesh.name, lod));
				if lod == 0 {
					writer::write_obj(&mesh, &dest)?;
					return Ok(dest);
				}
				let cells = self.cells_for_lod(lod);
				let mut decimated = self.cluster(&mesh, cells);
				if decimated.triangle_count() == 0 {
					debug!("LOD {} collapsed completely, keeping full detail", lod);
					decimated = mesh.clone();
				}
				info!(
					"LOD {}: {} cells, {} -> {} triangles",
					lod,
					cells,
					mesh.triangle_count(),
					decimated.triangle_count()
				);
				writer::write_obj(&decimated, &dest)?;
				Ok(dest)
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(DecimateResult { dest_files, bounds })
	}
}
