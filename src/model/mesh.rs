use crate::error::{Error, Result};
use crate::model::bounds::Box3;
use crate::model::vector3::Vector3;

/// Per-vertex texture coordinates, 2 or 3 components.
#[derive(Clone, Debug, PartialEq)]
pub enum TexCoords {
	Uv2(Vec<[f64; 2]>),
	Uvw3(Vec<[f64; 3]>),
}

impl TexCoords {
	pub fn len(&self) -> usize {
		match self {
			TexCoords::Uv2(uvs) => uvs.len(),
			TexCoords::Uvw3(uvws) => uvws.len(),
		}
	}

	/// Empty set of the same kind.
	pub fn empty_like(&self) -> TexCoords {
		match self {
			TexCoords::Uv2(_) => TexCoords::Uv2(Vec::new()),
			TexCoords::Uvw3(_) => TexCoords::Uvw3(Vec::new()),
		}
	}

	/// Appends `src[index]`. Both sides must be the same kind.
	pub fn push_from(&mut self, src: &TexCoords, index: usize) {
		match (self, src) {
			(TexCoords::Uv2(dst), TexCoords::Uv2(src)) => dst.push(src[index]),
			(TexCoords::Uvw3(dst), TexCoords::Uvw3(src)) => dst.push(src[index]),
			_ => {}
		}
	}

	/// Appends the interpolation between `src[a]` and `src[b]`.
	pub fn push_lerp(&mut self, src: &TexCoords, a: usize, b: usize, t: f64) {
		match (self, src) {
			(TexCoords::Uv2(dst), TexCoords::Uv2(src)) => {
				let (p, q) = (src[a], src[b]);
				dst.push([p[0] + (q[0] - p[0]) * t, p[1] + (q[1] - p[1]) * t]);
			}
			(TexCoords::Uvw3(dst), TexCoords::Uvw3(src)) => {
				let (p, q) = (src[a], src[b]);
				dst.push([
					p[0] + (q[0] - p[0]) * t,
					p[1] + (q[1] - p[1]) * t,
					p[2] + (q[2] - p[2]) * t,
				]);
			}
			_ => {}
		}
	}

	/// First two components of every coordinate.
	pub fn uv(&self) -> Vec<[f64; 2]> {
		match self {
			TexCoords::Uv2(uvs) => uvs.clone(),
			TexCoords::Uvw3(uvws) => uvws.iter().map(|c| [c[0], c[1]]).collect(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct SubMesh {
	pub indices: Vec<usize>,
	pub material: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Mesh {
	pub name: String,
	pub vertices: Vec<Vector3>,
	pub normals: Option<Vec<Vector3>>,
	pub tex_coords: Option<TexCoords>,
	pub submeshes: Vec<SubMesh>,
	pub material_libs: Vec<String>,
	bounds: Option<Box3>,
}

impl Mesh {
	pub fn new(name: &str) -> Mesh {
		Mesh {
			name: name.to_string(),
			..Default::default()
		}
	}

	pub fn triangle_count(&self) -> usize {
		self.submeshes.iter().map(|s| s.indices.len() / 3).sum()
	}

	pub fn validate(&self) -> Result<()> {
		if self.vertices.is_empty() {
			return Err(Error::malformed(&self.name, "mesh has no vertices"));
		}
		let count = self.vertices.len();
		if let Some(normals) = &self.normals {
			if normals.len() != count {
				return Err(Error::malformed(
					&self.name,
					format!("{} normals for {} vertices", normals.len(), count),
				));
			}
		}
		if let Some(tex) = &self.tex_coords {
			if tex.len() != count {
				return Err(Error::malformed(
					&self.name,
					format!("{} texture coordinates for {} vertices", tex.len(), count),
				));
			}
		}
		for submesh in &self.submeshes {
			if submesh.indices.len() % 3 != 0 {
				return Err(Error::malformed(
					&self.name,
					format!("index count {} is not a multiple of 3", submesh.indices.len()),
				));
			}
			for tri in submesh.indices.chunks(3) {
				if let Some(bad) = tri.iter().find(|&&i| i >= count) {
					return Err(Error::malformed(
						&self.name,
						format!("index {} out of range ({} vertices)", bad, count),
					));
				}
				if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
					return Err(Error::malformed(
						&self.name,
						format!("degenerate triangle {:?}", tri),
					));
				}
			}
		}
		Ok(())
	}

	/// Recomputes and caches the bounds from the vertex positions.
	pub fn compute_bounds(&mut self) -> Option<Box3> {
		self.bounds = Box3::from_points(&self.vertices);
		self.bounds
	}

	pub fn bounds(&self) -> Option<Box3> {
		self.bounds.or_else(|| Box3::from_points(&self.vertices))
	}

	pub fn barycenter(&self) -> Option<Vector3> {
		if self.vertices.is_empty() {
			return None;
		}
		let sum = self
			.vertices
			.iter()
			.fold(Vector3::empty(), |acc, v| acc + *v);
		Some(sum * (1.0 / self.vertices.len() as f64))
	}

	/// Total surface area of all triangles.
	pub fn area(&self) -> f64 {
		self.submeshes
			.iter()
			.flat_map(|s| s.indices.chunks(3))
			.map(|tri| {
				let a = self.vertices[tri[0]];
				let b = self.vertices[tri[1]];
				let c = self.vertices[tri[2]];
				(b - a).cross(&(c - a)).length() / 2.0
			})
			.sum()
	}

	/// Drops vertices no triangle references and empty submeshes.
	pub fn compact(&mut self) {
		let mut remap: Vec<Option<usize>> = vec![None; self.vertices.len()];
		let mut order = Vec::new();
		for submesh in &self.submeshes {
			for &i in &submesh.indices {
				if remap[i].is_none() {
					remap[i] = Some(order.len());
					order.push(i);
				}
			}
		}

		self.vertices = order.iter().map(|&i| self.vertices[i]).collect();
		if let Some(normals) = &self.normals {
			self.normals = Some(order.iter().map(|&i| normals[i]).collect());
		}
		if let Some(tex) = &self.tex_coords {
			let mut compacted = tex.empty_like();
			for &i in &order {
				compacted.push_from(tex, i);
			}
			self.tex_coords = Some(compacted);
		}
		self.submeshes.retain(|s| !s.indices.is_empty());
		for submesh in &mut self.submeshes {
			for i in submesh.indices.iter_mut() {
				if let Some(mapped) = remap[*i] {
					*i = mapped;
				}
			}
		}
		self.compute_bounds();
	}
}

#[cfg(test)]
pub mod tests {
	use super::{Mesh, SubMesh, TexCoords};
	use crate::error::Error;
	use crate::model::vector3::Vector3;

	/// Axis aligned unit cube made of 12 triangles with outward winding.
	pub fn unit_cube() -> Mesh {
		let mut mesh = Mesh::new("cube");
		for z in [0.0, 1.0] {
			for y in [0.0, 1.0] {
				for x in [0.0, 1.0] {
					mesh.vertices.push(Vector3::new(x, y, z));
				}
			}
		}
		mesh.submeshes.push(SubMesh {
			indices: vec![
				0, 2, 1, 1, 2, 3, // z = 0
				4, 5, 6, 5, 7, 6, // z = 1
				0, 1, 4, 1, 5, 4, // y = 0
				2, 6, 3, 3, 6, 7, // y = 1
				0, 4, 2, 2, 4, 6, // x = 0
				1, 3, 5, 3, 7, 5, // x = 1
			],
			material: Some("stone".to_string()),
		});
		mesh.compute_bounds();
		mesh
	}

	#[test]
	fn cube_is_valid_and_has_area_six() {
		let cube = unit_cube();
		cube.validate().unwrap();
		assert_eq!(cube.triangle_count(), 12);
		assert!((cube.area() - 6.0).abs() < 1e-12);
	}

	#[test]
	fn rejects_bad_meshes() {
		assert!(matches!(
			Mesh::new("empty").validate(),
			Err(Error::MalformedMesh { .. })
		));

		let mut cube = unit_cube();
		cube.submeshes[0].indices.push(0);
		assert!(cube.validate().is_err());

		let mut cube = unit_cube();
		cube.submeshes[0].indices[0] = 99;
		assert!(cube.validate().is_err());

		let mut cube = unit_cube();
		cube.submeshes[0].indices[1] = cube.submeshes[0].indices[0];
		assert!(cube.validate().is_err());

		let mut cube = unit_cube();
		cube.tex_coords = Some(TexCoords::Uv2(vec![[0.0, 0.0]]));
		assert!(cube.validate().is_err());
	}

	#[test]
	fn compact_drops_unused_vertices() {
		let mut mesh = Mesh::new("tri");
		mesh.vertices = vec![
			Vector3::new(9.0, 9.0, 9.0),
			Vector3::new(0.0, 0.0, 0.0),
			Vector3::new(1.0, 0.0, 0.0),
			Vector3::new(0.0, 1.0, 0.0),
		];
		mesh.tex_coords = Some(TexCoords::Uv2(vec![[9.0, 9.0], [0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]));
		mesh.submeshes = vec![
			SubMesh { indices: vec![1, 2, 3], material: None },
			SubMesh { indices: vec![], material: Some("unused".into()) },
		];
		mesh.compact();

		assert_eq!(mesh.vertices.len(), 3);
		assert_eq!(mesh.submeshes.len(), 1);
		assert_eq!(mesh.submeshes[0].indices, vec![0, 1, 2]);
		assert_eq!(mesh.tex_coords.as_ref().unwrap().len(), 3);
		assert_eq!(mesh.bounds().unwrap().max.x, 1.0);
		mesh.validate().unwrap();
	}
}
