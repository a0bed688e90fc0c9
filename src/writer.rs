use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::model::mesh::{Mesh, TexCoords};

pub fn write_obj(mesh: &Mesh, path: &Path) -> Result<()> {
	let file = File::create(path)?;
	let mut out = BufWriter::new(file);
	write_mesh(mesh, &mut out)?;
	out.flush()?;
	Ok(())
}

fn write_mesh<W: Write>(mesh: &Mesh, out: &mut W) -> Result<()> {
	for lib in &mesh.material_libs {
		writeln!(out, "mtllib {}", lib)?;
	}
	writeln!(out, "o {}", mesh.name)?;

	for v in &mesh.vertices {
		writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
	}
	if let Some(normals) = &mesh.normals {
		for n in normals {
			writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
		}
	}
	match &mesh.tex_coords {
		Some(TexCoords::Uv2(uvs)) => {
			for uv in uvs {
				writeln!(out, "vt {} {}", uv[0], uv[1])?;
			}
		}
		Some(TexCoords::Uvw3(uvws)) => {
			for uvw in uvws {
				writeln!(out, "vt {} {} {}", uvw[0], uvw[1], uvw[2])?;
			}
		}
		None => {}
	}

	let has_tex = mesh.tex_coords.is_some();
	let has_normals = mesh.normals.is_some();
	let corner = |i: usize| {
		let i = i + 1;
		match (has_tex, has_normals) {
			(true, true) => format!("{}/{}/{}", i, i, i),
			(true, false) => format!("{}/{}", i, i),
			(false, true) => format!("{}//{}", i, i),
			(false, false) => i.to_string(),
		}
	};

	for submesh in &mesh.submeshes {
		if let Some(material) = &submesh.material {
			writeln!(out, "usemtl {}", material)?;
		}
		for tri in submesh.indices.chunks(3) {
			writeln!(out, "f {} {} {}", corner(tri[0]), corner(tri[1]), corner(tri[2]))?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use crate::model::mesh::tests::unit_cube;
	use crate::obj_reader;
	use crate::writer::write_obj;

	#[test]
	fn written_mesh_reads_back() -> Result<(), Box<dyn std::error::Error>> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("cube.obj");
		let cube = unit_cube();
		write_obj(&cube, &path)?;

		let text = std::fs::read_to_string(&path)?;
		assert!(text.contains("usemtl stone"));

		let read = obj_reader::load_mesh(&path)?;
		assert_eq!(read.vertices.len(), 8);
		assert_eq!(read.triangle_count(), 12);
		assert_eq!(read.bounds(), cube.bounds());
		assert!((read.area() - cube.area()).abs() < 1e-12);
		assert_eq!(read.submeshes[0].material.as_deref(), Some("stone"));
		Ok(())
	}
}
