use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use log::{error, info, warn};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::model::mesh::Mesh;
use crate::obj_reader;
use crate::pipeline::PipelineContext;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const B3DM_MAGIC: &[u8; 4] = b"b3dm";
const B3DM_VERSION: u32 = 1;
pub const B3DM_HEADER_LENGTH: usize = 28;

pub trait ContentConverter: Sync {
	fn convert(&self, mesh_path: &Path, dest_path: &Path) -> Result<()>;
}

/// Writes an OBJ leaf as a batched 3D model: a glTF binary wrapped in a
/// b3dm container with an empty batch.
#[derive(Default)]
pub struct B3dmConverter;

impl ContentConverter for B3dmConverter {
	fn convert(&self, mesh_path: &Path, dest_path: &Path) -> Result<()> {
		let mesh = obj_reader::load_mesh(mesh_path)?;
		let glb = build_glb(&mesh)?;
		let b3dm = wrap_b3dm(&glb)?;
		let mut file = File::create(dest_path)?;
		file.write_all(&b3dm)?;
		Ok(())
	}
}

/// Pads `bytes` with `fill` so that `offset + len` is a multiple of `boundary`.
fn pad(bytes: &mut Vec<u8>, offset: usize, boundary: usize, fill: u8) {
	while (offset + bytes.len()) % boundary != 0 {
		bytes.push(fill);
	}
}

fn push_view(
	views: &mut Vec<json::buffer::View>,
	offset: usize,
	length: usize,
	target: json::buffer::Target,
) -> u32 {
	views.push(json::buffer::View {
		buffer: json::Index::new(0),
		byte_length: USize64(length as u64),
		byte_offset: Some(USize64(offset as u64)),
		byte_stride: None,
		extensions: Default::default(),
		extras: Default::default(),
		target: Some(Valid(target)),
	});
	(views.len() - 1) as u32
}

fn push_accessor(
	accessors: &mut Vec<json::Accessor>,
	view: u32,
	count: usize,
	type_: json::accessor::Type,
	component_type: json::accessor::ComponentType,
	bounds: Option<(json::Value, json::Value)>,
) -> json::Index<json::Accessor> {
	let (min, max) = match bounds {
		Some((min, max)) => (Some(min), Some(max)),
		None => (None, None),
	};
	accessors.push(json::Accessor {
		buffer_view: Some(json::Index::new(view)),
		byte_offset: Some(USize64(0)),
		count: USize64(count as u64),
		component_type: Valid(json::accessor::GenericComponentType(component_type)),
		extensions: Default::default(),
		extras: Default::default(),
		type_: Valid(type_),
		min,
		max,
		normalized: false,
		sparse: None,
	});
	json::Index::new((accessors.len() - 1) as u32)
}

fn material() -> json::Material {
	json::Material {
		pbr_metallic_roughness: json::material::PbrMetallicRoughness {
			base_color_texture: None,
			base_color_factor: json::material::PbrBaseColorFactor([1.0, 1.0, 1.0, 1.0]),
			metallic_factor: json::material::StrengthFactor(0.0),
			roughness_factor: json::material::StrengthFactor(1.0),
			metallic_roughness_texture: None,
			extensions: Default::default(),
			extras: Default::default(),
		},
		alpha_mode: Valid(json::material::AlphaMode::Opaque),
		alpha_cutoff: None,
		double_sided: true,
		normal_texture: None,
		occlusion_texture: None,
		emissive_texture: None,
		emissive_factor: json::material::EmissiveFactor([0.0, 0.0, 0.0]),
		extensions: Default::default(),
		extras: Default::default(),
	}
}

/// Builds a glTF binary with one primitive per submesh. The JSON chunk is
/// padded so that the whole glb stays 8 byte aligned inside a b3dm.
pub fn build_glb(mesh: &Mesh) -> Result<Vec<u8>> {
	let bounds = mesh
		.bounds()
		.ok_or_else(|| Error::malformed(&mesh.name, "mesh has no vertices"))?;
	let count = mesh.vertices.len();
	let mut binary: Vec<u8> = Vec::new();
	let mut views = Vec::new();
	let mut accessors = Vec::new();
	let mut attributes = BTreeMap::new();

	let offset = binary.len();
	for v in &mesh.vertices {
		binary.write_f32::<LittleEndian>(v.x as f32)?;
		binary.write_f32::<LittleEndian>(v.y as f32)?;
		binary.write_f32::<LittleEndian>(v.z as f32)?;
	}
	let view = push_view(&mut views, offset, binary.len() - offset, json::buffer::Target::ArrayBuffer);
	let positions = push_accessor(
		&mut accessors,
		view,
		count,
		json::accessor::Type::Vec3,
		json::accessor::ComponentType::F32,
		Some((
			json::Value::from(vec![bounds.min.x as f32, bounds.min.y as f32, bounds.min.z as f32]),
			json::Value::from(vec![bounds.max.x as f32, bounds.max.y as f32, bounds.max.z as f32]),
		)),
	);
	attributes.insert(Valid(json::mesh::Semantic::Positions), positions);

	if let Some(normals) = &mesh.normals {
		let offset = binary.len();
		for n in normals {
			binary.write_f32::<LittleEndian>(n.x as f32)?;
			binary.write_f32::<LittleEndian>(n.y as f32)?;
			binary.write_f32::<LittleEndian>(n.z as f32)?;
		}
		let view = push_view(&mut views, offset, binary.len() - offset, json::buffer::Target::ArrayBuffer);
		let accessor = push_accessor(
			&mut accessors,
			view,
			count,
			json::accessor::Type::Vec3,
			json::accessor::ComponentType::F32,
			None,
		);
		attributes.insert(Valid(json::mesh::Semantic::Normals), accessor);
	}

	if let Some(tex) = &mesh.tex_coords {
		let offset = binary.len();
		for uv in tex.uv() {
			binary.write_f32::<LittleEndian>(uv[0] as f32)?;
			// glTF puts the texture origin top left
			binary.write_f32::<LittleEndian>(1.0 - uv[1] as f32)?;
		}
		let view = push_view(&mut views, offset, binary.len() - offset, json::buffer::Target::ArrayBuffer);
		let accessor = push_accessor(
			&mut accessors,
			view,
			count,
			json::accessor::Type::Vec2,
			json::accessor::ComponentType::F32,
			None,
		);
		attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), accessor);
	}

	let mut primitives = Vec::new();
	let mut materials = Vec::new();
	for submesh in &mesh.submeshes {
		let offset = binary.len();
		for &i in &submesh.indices {
			binary.write_u32::<LittleEndian>(i as u32)?;
		}
		let view = push_view(
			&mut views,
			offset,
			binary.len() - offset,
			json::buffer::Target::ElementArrayBuffer,
		);
		let indices = push_accessor(
			&mut accessors,
			view,
			submesh.indices.len(),
			json::accessor::Type::Scalar,
			json::accessor::ComponentType::U32,
			None,
		);
		materials.push(material());
		primitives.push(json::mesh::Primitive {
			attributes: attributes.clone(),
			extensions: Default::default(),
			extras: Default::default(),
			indices: Some(indices),
			material: Some(json::Index::new((materials.len() - 1) as u32)),
			mode: Valid(json::mesh::Mode::Triangles),
			targets: None,
		});
	}

	let root = json::Root {
		asset: json::Asset {
			copyright: None,
			extensions: Default::default(),
			extras: Default::default(),
			generator: Some("rusty-tiles-converter".to_string()),
			min_version: None,
			version: "2.0".to_string(),
		},
		accessors,
		buffers: vec![json::Buffer {
			byte_length: USize64(binary.len() as u64),
			extensions: Default::default(),
			extras: Default::default(),
			uri: None,
		}],
		buffer_views: views,
		materials,
		meshes: vec![json::Mesh {
			extensions: Default::default(),
			extras: Default::default(),
			primitives,
			weights: None,
		}],
		nodes: vec![json::Node {
			camera: None,
			children: None,
			extensions: Default::default(),
			extras: Default::default(),
			matrix: None,
			mesh: Some(json::Index::new(0)),
			rotation: None,
			scale: None,
			translation: None,
			skin: None,
			weights: None,
		}],
		scenes: vec![json::Scene {
			extensions: Default::default(),
			extras: Default::default(),
			nodes: vec![json::Index::new(0)],
		}],
		scene: Some(json::Index::new(0)),
		..Default::default()
	};

	pad(&mut binary, 0, 4, 0);
	let mut json_chunk = json::serialize::to_string(&root)?.into_bytes();
	pad(&mut json_chunk, 12 + 8 + 8 + binary.len(), 8, b' ');

	let total = 12 + 8 + json_chunk.len() + 8 + binary.len();
	let mut glb = Vec::with_capacity(total);
	glb.extend_from_slice(GLB_MAGIC);
	glb.write_u32::<LittleEndian>(GLB_VERSION)?;
	glb.write_u32::<LittleEndian>(total as u32)?;
	glb.write_u32::<LittleEndian>(json_chunk.len() as u32)?;
	glb.write_u32::<LittleEndian>(CHUNK_JSON)?;
	glb.extend_from_slice(&json_chunk);
	glb.write_u32::<LittleEndian>(binary.len() as u32)?;
	glb.write_u32::<LittleEndian>(CHUNK_BIN)?;
	glb.extend_from_slice(&binary);
	Ok(glb)
}

pub fn wrap_b3dm(glb: &[u8]) -> Result<Vec<u8>> {
	let mut feature_table = br#"{"BATCH_LENGTH":0}"#.to_vec();
	pad(&mut feature_table, B3DM_HEADER_LENGTH, 8, b' ');

	let total = B3DM_HEADER_LENGTH + feature_table.len() + glb.len();
	let mut out = Vec::with_capacity(total);
	out.extend_from_slice(B3DM_MAGIC);
	out.write_u32::<LittleEndian>(B3DM_VERSION)?;
	out.write_u32::<LittleEndian>(total as u32)?;
	out.write_u32::<LittleEndian>(feature_table.len() as u32)?;
	out.write_u32::<LittleEndian>(0)?; // feature table binary
	out.write_u32::<LittleEndian>(0)?; // batch table json
	out.write_u32::<LittleEndian>(0)?; // batch table binary
	out.extend_from_slice(&feature_table);
	out.extend_from_slice(glb);
	Ok(out)
}

pub struct ConversionSummary {
	pub converted: usize,
	pub failures: Vec<(PathBuf, Error)>,
}

fn obj_files(dir: &Path) -> Result<Vec<PathBuf>> {
	let mut files = Vec::new();
	if !dir.exists() {
		return Ok(files);
	}
	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		if path.extension().and_then(|e| e.to_str()) == Some("obj") {
			files.push(path);
		}
	}
	files.sort();
	Ok(files)
}

/// Converts every `LOD-{n}/*.obj` below `source_root` into
/// `dest_root/LOD-{n}/*.b3dm`. Failures are collected, not fatal.
pub fn convert_all(
	ctx: &PipelineContext,
	converter: &dyn ContentConverter,
	source_root: &Path,
	dest_root: &Path,
	lods: usize,
) -> Result<ConversionSummary> {
	let mut jobs = Vec::new();
	for lod in 0..lods {
		let folder = format!("LOD-{}", lod);
		let out_dir = dest_root.join(&folder);
		fs::create_dir_all(&out_dir)?;
		for file in obj_files(&source_root.join(&folder))? {
			let dest = out_dir.join(file.with_extension("b3dm").file_name().unwrap_or_default());
			jobs.push((file, dest));
		}
	}

	let failures: Vec<(PathBuf, Error)> = jobs
		.par_iter()
		.filter_map(|(source, dest)| {
			info!("[{}] Converting {} to b3dm", ctx.run_id, source.display());
			match converter.convert(source, dest) {
				Ok(()) => None,
				Err(err) => {
					error!("[{}] Conversion of {} failed: {}", ctx.run_id, source.display(), err);
					Some((source.clone(), err))
				}
			}
		})
		.collect();

	let summary = ConversionSummary {
		converted: jobs.len() - failures.len(),
		failures,
	};
	if summary.failures.is_empty() {
		info!("[{}] Converted {} tiles", ctx.run_id, summary.converted);
	} else {
		warn!(
			"[{}] Converted {} tiles, {} failed",
			ctx.run_id,
			summary.converted,
			summary.failures.len()
		);
	}
	Ok(summary)
}
