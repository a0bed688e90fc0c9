use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::model::mesh::{Mesh, SubMesh, TexCoords};
use crate::model::vector3::Vector3;

const TEXTURE_KEYS: [&str; 9] = [
	"map_Kd", "map_Ka", "map_Ks", "map_Bump", "map_d", "map_Ns", "bump", "disp", "decal",
];

type Corner = (usize, Option<usize>, Option<usize>);

struct ObjParser {
	positions: Vec<Vector3>,
	normals: Vec<Vector3>,
	tex: Vec<[f64; 3]>,
	tex_dims: usize,
	corners: HashMap<Corner, usize>,
	order: Vec<Corner>,
	submeshes: Vec<SubMesh>,
	material_libs: Vec<String>,
}

fn obj_err(line: usize, reason: impl Into<String>) -> Error {
	Error::Obj {
		line,
		reason: reason.into(),
	}
}

fn parse_floats<'a>(line: usize, tokens: impl Iterator<Item = &'a str>) -> Result<Vec<f64>> {
	tokens
		.map(|t| {
			t.parse::<f64>()
				.map_err(|_| obj_err(line, format!("invalid number '{}'", t)))
		})
		.collect()
}

fn resolve_index(line: usize, token: &str, count: usize) -> Result<usize> {
	let idx: i64 = token
		.parse()
		.map_err(|_| obj_err(line, format!("invalid index '{}'", token)))?;
	let resolved = if idx > 0 {
		idx - 1
	} else if idx < 0 {
		count as i64 + idx
	} else {
		return Err(obj_err(line, "index 0 is not valid"));
	};
	if resolved < 0 || resolved as usize >= count {
		return Err(obj_err(line, format!("index {} out of range", idx)));
	}
	Ok(resolved as usize)
}

impl ObjParser {
	fn new() -> ObjParser {
		ObjParser {
			positions: Vec::new(),
			normals: Vec::new(),
			tex: Vec::new(),
			tex_dims: 2,
			corners: HashMap::new(),
			order: Vec::new(),
			submeshes: vec![SubMesh::default()],
			material_libs: Vec::new(),
		}
	}

	fn corner(&mut self, line: usize, token: &str) -> Result<usize> {
		let mut parts = token.split('/');
		let v = resolve_index(line, parts.next().unwrap_or(""), self.positions.len())?;
		let t = match parts.next() {
			Some(t) if !t.is_empty() => Some(resolve_index(line, t, self.tex.len())?),
			_ => None,
		};
		let n = match parts.next() {
			Some(n) if !n.is_empty() => Some(resolve_index(line, n, self.normals.len())?),
			_ => None,
		};
		let key = (v, t, n);
		if let Some(&index) = self.corners.get(&key) {
			return Ok(index);
		}
		let index = self.order.len();
		self.corners.insert(key, index);
		self.order.push(key);
		Ok(index)
	}

	fn face<'a>(&mut self, line: usize, tokens: impl Iterator<Item = &'a str>) -> Result<()> {
		let corners = tokens
			.map(|t| self.corner(line, t))
			.collect::<Result<Vec<_>>>()?;
		if corners.len() < 3 {
			return Err(obj_err(line, "face needs at least 3 vertices"));
		}
		let submesh = self
			.submeshes
			.last_mut()
			.ok_or_else(|| obj_err(line, "no active material group"))?;
		for i in 1..corners.len() - 1 {
			let tri = [corners[0], corners[i], corners[i + 1]];
			if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
				debug!("Skipping degenerate face on line {}", line);
				continue;
			}
			submesh.indices.extend_from_slice(&tri);
		}
		Ok(())
	}

	fn use_material(&mut self, material: &str) {
		let material = Some(material.to_string());
		if let Some(existing) = self.submeshes.iter().position(|s| s.material == material) {
			let submesh = self.submeshes.remove(existing);
			self.submeshes.push(submesh);
		} else {
			self.submeshes.push(SubMesh {
				indices: Vec::new(),
				material,
			});
		}
	}

	fn into_mesh(self, name: &str) -> Mesh {
		let mut mesh = Mesh::new(name);
		mesh.vertices = self.order.iter().map(|&(v, _, _)| self.positions[v]).collect();
		if self.order.iter().any(|&(_, _, n)| n.is_some()) {
			mesh.normals = Some(
				self.order
					.iter()
					.map(|&(_, _, n)| n.map(|n| self.normals[n]).unwrap_or_default())
					.collect(),
			);
		}
		if self.order.iter().any(|&(_, t, _)| t.is_some()) {
			let coords = self
				.order
				.iter()
				.map(|&(_, t, _)| t.map(|t| self.tex[t]).unwrap_or([0.0; 3]));
			mesh.tex_coords = Some(if self.tex_dims == 3 {
				TexCoords::Uvw3(coords.collect())
			} else {
				TexCoords::Uv2(coords.map(|c| [c[0], c[1]]).collect())
			});
		}
		mesh.submeshes = self
			.submeshes
			.into_iter()
			.filter(|s| !s.indices.is_empty())
			.collect();
		mesh.material_libs = self.material_libs;
		mesh.compute_bounds();
		mesh
	}
}

/// Parses Wavefront OBJ text into a mesh with deduplicated face corners.
pub fn from_obj(name: &str, text: &str) -> Result<Mesh> {
	let mut parser = ObjParser::new();

	for (i, raw) in text.lines().enumerate() {
		let line = i + 1;
		let content = raw.split('#').next().unwrap_or("").trim();
		let mut tokens = content.split_whitespace();
		let keyword = match tokens.next() {
			Some(k) => k,
			None => continue,
		};
		match keyword {
			"v" => {
				let values = parse_floats(line, tokens)?;
				if values.len() < 3 {
					return Err(obj_err(line, "vertex needs 3 coordinates"));
				}
				parser.positions.push(Vector3::new(values[0], values[1], values[2]));
			}
			"vn" => {
				let values = parse_floats(line, tokens)?;
				if values.len() < 3 {
					return Err(obj_err(line, "normal needs 3 components"));
				}
				parser.normals.push(Vector3::new(values[0], values[1], values[2]));
			}
			"vt" => {
				let values = parse_floats(line, tokens)?;
				match values.len() {
					2 => parser.tex.push([values[0], values[1], 0.0]),
					n if n >= 3 => {
						parser.tex_dims = 3;
						parser.tex.push([values[0], values[1], values[2]]);
					}
					_ => return Err(obj_err(line, "texture coordinate needs 2 or 3 components")),
				}
			}
			"f" => parser.face(line, tokens)?,
			"usemtl" => parser.use_material(&tokens.collect::<Vec<_>>().join(" ")),
			"mtllib" => parser
				.material_libs
				.push(tokens.collect::<Vec<_>>().join(" ")),
			_ => {}
		}
	}

	let mesh = parser.into_mesh(name);
	mesh.validate()?;
	Ok(mesh)
}

pub fn load_mesh(path: &Path) -> Result<Mesh> {
	let text = fs::read_to_string(path)?;
	let name = path
		.file_stem()
		.and_then(|s| s.to_str())
		.unwrap_or("mesh");
	from_obj(name, &text)
}

/// Texture files referenced by a material library.
pub fn material_textures(mtl: &str) -> Vec<String> {
	mtl.lines()
		.filter_map(|line| {
			let mut tokens = line.split_whitespace();
			let key = tokens.next()?;
			if !TEXTURE_KEYS.contains(&key) {
				return None;
			}
			// options such as -bm 1.0 come before the file name
			tokens.last().map(str::to_string)
		})
		.collect()
}

/// Material libraries and their textures, relative to the mesh's folder.
pub fn dependencies(mesh: &Mesh, source_dir: &Path) -> Vec<PathBuf> {
	let mut deps = Vec::new();
	for lib in &mesh.material_libs {
		let lib_path = PathBuf::from(lib);
		if lib_path.is_absolute() {
			debug!("Skipping rooted material library {}", lib);
			continue;
		}
		if let Ok(text) = fs::read_to_string(source_dir.join(&lib_path)) {
			for texture in material_textures(&text) {
				let texture = PathBuf::from(texture);
				if texture.is_absolute() {
					debug!("Skipping rooted texture {}", texture.display());
					continue;
				}
				if !deps.contains(&texture) {
					deps.push(texture);
				}
			}
		}
		deps.push(lib_path);
	}
	deps
}

/// Copies material dependencies next to the written leaves.
pub fn copy_dependencies(mesh: &Mesh, source_dir: &Path, dest_dir: &Path) -> Result<()> {
	for dep in dependencies(mesh, source_dir) {
		let from = source_dir.join(&dep);
		if !from.exists() {
			debug!("Dependency {} not found", from.display());
			continue;
		}
		let to = dest_dir.join(&dep);
		if let Some(parent) = to.parent() {
			fs::create_dir_all(parent)?;
		}
		if !to.exists() {
			fs::copy(&from, &to)?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::{copy_dependencies, from_obj, load_mesh, material_textures};
	use crate::error::Error;
	use crate::model::mesh::TexCoords;
	use std::fs;

	const QUAD: &str = "
mtllib scene.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl grass
f 1/1/1 2/2/1 3/3/1 4/4/1
usemtl rock
f -4/-4/1 -2/-2/1 -1/-1/1
";

	#[test]
	fn reads_quads_materials_and_negative_indices() {
		let mesh = from_obj("quad", QUAD).unwrap();
		assert_eq!(mesh.vertices.len(), 4);
		assert_eq!(mesh.submeshes.len(), 2);
		assert_eq!(mesh.submeshes[0].material.as_deref(), Some("grass"));
		assert_eq!(mesh.submeshes[0].indices, vec![0, 1, 2, 0, 2, 3]);
		// corners 1, 3, 4 are shared with the first face
		assert_eq!(mesh.submeshes[1].indices, vec![0, 2, 3]);
		assert!(matches!(mesh.tex_coords, Some(TexCoords::Uv2(_))));
		assert_eq!(mesh.normals.as_ref().unwrap().len(), 4);
		assert_eq!(mesh.material_libs, vec!["scene.mtl".to_string()]);
		assert_eq!(mesh.bounds().unwrap().max.y, 1.0);
	}

	#[test]
	fn reports_line_of_bad_index() {
		let err = from_obj("bad", "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 7\n").unwrap_err();
		assert!(matches!(err, Error::Obj { line: 4, .. }));
	}

	#[test]
	fn uvw_coordinates_are_kept() {
		let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0 1\nvt 1 0 1\nvt 0 1 1\nf 1/1 2/2 3/3\n";
		let mesh = from_obj("uvw", text).unwrap();
		assert!(matches!(mesh.tex_coords, Some(TexCoords::Uvw3(ref c)) if c.len() == 3));
	}

	#[test]
	fn copies_material_and_textures() -> Result<(), Box<dyn std::error::Error>> {
		let src = tempfile::tempdir()?;
		let dst = tempfile::tempdir()?;
		fs::write(src.path().join("scene.obj"), QUAD)?;
		fs::write(
			src.path().join("scene.mtl"),
			"newmtl grass\nmap_Kd tex/grass.png\nbump -bm 0.5 tex/bump.png\n",
		)?;
		fs::create_dir(src.path().join("tex"))?;
		fs::write(src.path().join("tex/grass.png"), [1u8, 2, 3])?;

		assert_eq!(
			material_textures("map_Kd a.png\nmap_Bump b.png\nKd 1 1 1\n"),
			vec!["a.png".to_string(), "b.png".to_string()]
		);

		let mesh = load_mesh(&src.path().join("scene.obj"))?;
		assert_eq!(mesh.name, "scene");
		copy_dependencies(&mesh, src.path(), dst.path())?;
		assert!(dst.path().join("scene.mtl").exists());
		assert!(dst.path().join("tex/grass.png").exists());
		assert!(!dst.path().join("tex/bump.png").exists());
		Ok(())
	}
}
