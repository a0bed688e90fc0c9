use std::collections::HashMap;

use crate::model::mesh::{Mesh, SubMesh, TexCoords};
use crate::model::vector3::Vector3;

/// Distance under which a vertex counts as lying on the plane.
pub const PLANE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
	Left,
	On,
	Right,
}

fn classify(value: f64, q: f64) -> Side {
	let d = value - q;
	if d < -PLANE_EPSILON {
		Side::Left
	} else if d > PLANE_EPSILON {
		Side::Right
	} else {
		Side::On
	}
}

/// Vertex arena of one side of a split. Parent indices are remapped to
/// fresh child indices on first use.
struct SideBuilder<'a> {
	source: &'a Mesh,
	vertices: Vec<Vector3>,
	normals: Option<Vec<Vector3>>,
	tex_coords: Option<TexCoords>,
	remap: HashMap<usize, usize>,
	submeshes: Vec<SubMesh>,
}

impl<'a> SideBuilder<'a> {
	fn new(source: &'a Mesh) -> SideBuilder<'a> {
		SideBuilder {
			source,
			vertices: Vec::new(),
			normals: source.normals.as_ref().map(|_| Vec::new()),
			tex_coords: source.tex_coords.as_ref().map(|t| t.empty_like()),
			remap: HashMap::new(),
			submeshes: source
				.submeshes
				.iter()
				.map(|s| SubMesh {
					indices: Vec::new(),
					material: s.material.clone(),
				})
				.collect(),
		}
	}

	fn parent_vertex(&mut self, parent: usize) -> usize {
		if let Some(&index) = self.remap.get(&parent) {
			return index;
		}
		let index = self.vertices.len();
		self.vertices.push(self.source.vertices[parent]);
		if let (Some(dst), Some(src)) = (self.normals.as_mut(), self.source.normals.as_ref()) {
			dst.push(src[parent]);
		}
		if let (Some(dst), Some(src)) = (self.tex_coords.as_mut(), self.source.tex_coords.as_ref()) {
			dst.push_from(src, parent);
		}
		self.remap.insert(parent, index);
		index
	}

	/// Adds the point at `t` along the parent edge `a -> b`.
	fn edge_vertex(&mut self, a: usize, b: usize, t: f64, axis: usize, q: f64) -> usize {
		let index = self.vertices.len();
		let src = self.source;
		let mut position = src.vertices[a].lerp(&src.vertices[b], t);
		match axis {
			0 => position.x = q,
			1 => position.y = q,
			_ => position.z = q,
		}
		self.vertices.push(position);
		if let (Some(dst), Some(normals)) = (self.normals.as_mut(), src.normals.as_ref()) {
			dst.push(normals[a].lerp(&normals[b], t).normalized());
		}
		if let (Some(dst), Some(tex)) = (self.tex_coords.as_mut(), src.tex_coords.as_ref()) {
			dst.push_lerp(tex, a, b, t);
		}
		index
	}

	fn push_polygon(&mut self, submesh: usize, polygon: &[usize]) {
		for i in 1..polygon.len().saturating_sub(1) {
			let tri = [polygon[0], polygon[i], polygon[i + 1]];
			if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
				continue;
			}
			self.submeshes[submesh].indices.extend_from_slice(&tri);
		}
	}

	fn finish(self) -> Option<Mesh> {
		let submeshes: Vec<SubMesh> = self
			.submeshes
			.into_iter()
			.filter(|s| !s.indices.is_empty())
			.collect();
		if submeshes.is_empty() {
			return None;
		}
		let mut mesh = Mesh::new(&self.source.name);
		mesh.vertices = self.vertices;
		mesh.normals = self.normals;
		mesh.tex_coords = self.tex_coords;
		mesh.submeshes = submeshes;
		mesh.material_libs = self.source.material_libs.clone();
		mesh.compute_bounds();
		Some(mesh)
	}
}

pub struct ClipResult {
	pub left: Option<Mesh>,
	pub right: Option<Mesh>,
	pub edge_splits: usize,
}

/// Cuts `mesh` with the plane `axis = q`. Triangles touching the plane
/// without crossing it are kept whole; crossing triangles are clipped and
/// fan triangulated on both sides with their winding preserved.
pub fn clip(mesh: &Mesh, axis: usize, q: f64) -> ClipResult {
	let mut left = SideBuilder::new(mesh);
	let mut right = SideBuilder::new(mesh);
	// unordered parent pair -> (left index, right index)
	let mut edge_cache: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
	let mut edge_splits = 0;

	for (s, submesh) in mesh.submeshes.iter().enumerate() {
		for tri in submesh.indices.chunks(3) {
			let sides = [
				classify(mesh.vertices[tri[0]].get(axis), q),
				classify(mesh.vertices[tri[1]].get(axis), q),
				classify(mesh.vertices[tri[2]].get(axis), q),
			];

			if !sides.contains(&Side::Right) {
				let polygon: Vec<usize> = tri.iter().map(|&i| left.parent_vertex(i)).collect();
				left.push_polygon(s, &polygon);
				continue;
			}
			if !sides.contains(&Side::Left) {
				let polygon: Vec<usize> = tri.iter().map(|&i| right.parent_vertex(i)).collect();
				right.push_polygon(s, &polygon);
				continue;
			}

			let mut left_polygon = Vec::with_capacity(4);
			let mut right_polygon = Vec::with_capacity(4);
			for k in 0..3 {
				let (a, b) = (tri[k], tri[(k + 1) % 3]);
				let (side_a, side_b) = (sides[k], sides[(k + 1) % 3]);

				match side_a {
					Side::Left => left_polygon.push(left.parent_vertex(a)),
					Side::Right => right_polygon.push(right.parent_vertex(a)),
					Side::On => {
						left_polygon.push(left.parent_vertex(a));
						right_polygon.push(right.parent_vertex(a));
					}
				}

				let crosses = matches!(
					(side_a, side_b),
					(Side::Left, Side::Right) | (Side::Right, Side::Left)
				);
				if crosses {
					let key = (a.min(b), a.max(b));
					let (l, r) = match edge_cache.get(&key) {
						Some(&pair) => pair,
						None => {
							let (p, n) = key;
							let vp = mesh.vertices[p].get(axis);
							let vn = mesh.vertices[n].get(axis);
							let t = (q - vp) / (vn - vp);
							let pair = (
								left.edge_vertex(p, n, t, axis, q),
								right.edge_vertex(p, n, t, axis, q),
							);
							edge_cache.insert(key, pair);
							edge_splits += 1;
							pair
						}
					};
					left_polygon.push(l);
					right_polygon.push(r);
				}
			}
			left.push_polygon(s, &left_polygon);
			right.push_polygon(s, &right_polygon);
		}
	}

	ClipResult {
		left: left.finish(),
		right: right.finish(),
		edge_splits,
	}
}

#[cfg(test)]
mod tests {
	use super::clip;
	use crate::model::mesh::tests::unit_cube;
	use crate::model::mesh::{Mesh, SubMesh, TexCoords};
	use crate::model::vector3::Vector3;
	use approx::assert_relative_eq;

	fn triangle() -> Mesh {
		let mut mesh = Mesh::new("tri");
		mesh.vertices = vec![
			Vector3::new(0.0, 0.0, 0.0),
			Vector3::new(2.0, 0.0, 0.0),
			Vector3::new(0.0, 2.0, 0.0),
		];
		mesh.normals = Some(vec![Vector3::new(0.0, 0.0, 1.0); 3]);
		mesh.tex_coords = Some(TexCoords::Uv2(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]));
		mesh.submeshes = vec![SubMesh {
			indices: vec![0, 1, 2],
			material: None,
		}];
		mesh
	}

	fn normal_z(mesh: &Mesh) -> Vec<f64> {
		mesh.submeshes[0]
			.indices
			.chunks(3)
			.map(|t| {
				let (a, b, c) = (mesh.vertices[t[0]], mesh.vertices[t[1]], mesh.vertices[t[2]]);
				(b - a).cross(&(c - a)).z
			})
			.collect()
	}

	#[test]
	fn crossing_triangle_is_clipped_on_both_sides() {
		let mesh = triangle();
		let result = clip(&mesh, 0, 1.0);
		let left = result.left.unwrap();
		let right = result.right.unwrap();

		assert_eq!(result.edge_splits, 2);
		// quad on the left, triangle on the right
		assert_eq!(left.triangle_count() + right.triangle_count(), 3);
		assert_eq!(right.triangle_count(), 1);
		assert_relative_eq!(left.area() + right.area(), mesh.area(), epsilon = 1e-12);
		assert!(left.bounds().unwrap().max.x <= 1.0);
		assert!(right.bounds().unwrap().min.x >= 1.0);

		// winding stays counter-clockwise seen from +z
		assert!(normal_z(&left).iter().chain(normal_z(&right).iter()).all(|&z| z > 0.0));

		// interpolated attributes on the cut
		let uvs = right.tex_coords.as_ref().unwrap().uv();
		assert!(uvs.iter().any(|uv| (uv[0] - 0.5).abs() < 1e-12 && uv[1].abs() < 1e-12));
		for n in right.normals.as_ref().unwrap() {
			assert_relative_eq!(n.length(), 1.0);
		}
	}

	#[test]
	fn triangle_touching_plane_is_not_cut() {
		let mesh = triangle();
		let result = clip(&mesh, 0, 0.0);
		assert!(result.left.is_none());
		assert_eq!(result.right.unwrap().triangle_count(), 1);
		assert_eq!(result.edge_splits, 0);
	}

	#[test]
	fn shared_edges_are_split_once() {
		let cube = unit_cube();
		let result = clip(&cube, 0, 0.5);
		// four cube edges along x plus one diagonal per crossing face
		assert_eq!(result.edge_splits, 8);
		let left = result.left.unwrap();
		let right = result.right.unwrap();
		assert_eq!(left.vertices.len(), 4 + 8);
		assert_eq!(right.vertices.len(), 4 + 8);
		assert_relative_eq!(left.area() + right.area(), 6.0, epsilon = 1e-12);
		left.validate().unwrap();
		right.validate().unwrap();
	}
}
