use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::csv_reader::Instance;
use crate::error::{AssemblyIssue, Error, Result};
use crate::model::bounds::Box3;
use crate::model::coords::{translation_matrix, GpsCoords};
use crate::pipeline::PipelineContext;
use crate::tiling::grid::{
	analyze_grid, block_dim, localized_extents, merge_up, populate_level0, LodLevel, Tile,
	BRANCH_FACTOR,
};
use crate::tiling::mesh_pyramid::BASE_ERROR;
use crate::tiling::tileset::{
	read_tileset, write_tileset, BoundingVolume, Refine, TileElement, Tileset,
};

/// A model tileset placed by the instances of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
	/// Tileset location relative to the output root.
	pub uri: String,
	pub geometric_error: f64,
	/// Extent in metres around the model origin.
	pub local_bounds: Box3,
}

impl ModelInfo {
	pub fn from_tileset(uri: &str, tileset: &Tileset) -> ModelInfo {
		let local_bounds = match &tileset.root.bounding_volume {
			BoundingVolume::Region(r) => {
				let center = GpsCoords::new(
					((r[2] + r[3]) / 2.0).to_degrees(),
					((r[0] + r[1]) / 2.0).to_degrees(),
					r[4],
				);
				center.local_from_region(r)
			}
			volume => volume.local_box(&GpsCoords::default()),
		};
		ModelInfo {
			uri: uri.to_string(),
			geometric_error: tileset.geometric_error,
			local_bounds,
		}
	}
}

pub struct GridPyramid {
	pub root_path: PathBuf,
	pub levels: Vec<LodLevel>,
	pub issues: Vec<AssemblyIssue>,
}

fn level_dir(level: usize) -> String {
	format!("LOD_{}", level)
}

fn union_all(boxes: impl IntoIterator<Item = Box3>) -> Option<Box3> {
	boxes
		.into_iter()
		.fold(None, |acc: Option<Box3>, b| Some(acc.map_or(b, |a| a.union(&b))))
}

/// Builds the tileset of one LOD0 cell: one child per instance pointing at
/// its model, placed relative to the cell center.
fn leaf_tileset(
	tile: &Tile,
	instances: &[Instance],
	models: &HashMap<String, ModelInfo>,
	reference: &GpsCoords,
) -> Result<Tileset> {
	let center = tile.state().center.unwrap_or_default();
	let mut children = Vec::with_capacity(instances.len());
	let mut boxes = Vec::with_capacity(instances.len());
	let mut error: f64 = 0.0;

	for instance in instances {
		let model = models.get(&instance.kind).ok_or_else(|| {
			Error::InvalidInput(format!("no model for instance type '{}'", instance.kind))
		})?;
		let placed = model.local_bounds.translated(instance.position);
		boxes.push(placed);
		error = error.max(model.geometric_error);
		children.push(
			TileElement::new(
				model.geometric_error,
				Refine::Add,
				BoundingVolume::region(reference, &placed),
			)
			.with_content(format!("../{}", model.uri))
			.with_transform(Some(translation_matrix(&(instance.position - center)))),
		);
	}

	let extent = union_all(boxes)
		.ok_or_else(|| Error::InvalidInput(format!("tile {} has no instances", tile.name())))?;
	error = error.max(extent.diagonal());

	let mut root = TileElement::new(error, Refine::Add, BoundingVolume::region(reference, &extent));
	for child in children {
		root.add_child(child);
	}
	Ok(Tileset::new(root))
}

/// Builds the tileset of a merged tile referencing the tilesets of its
/// children one level down.
fn aggregate_tileset(
	children: &[&Tile],
	child_level: usize,
	reference: &GpsCoords,
) -> Option<Tileset> {
	let mut root_children = Vec::new();
	let mut boxes = Vec::new();
	for child in children {
		let state = child.state();
		let volume = match (&state.path, &state.bounding_volume) {
			(Some(_), Some(volume)) => volume,
			_ => continue,
		};
		boxes.push(volume.local_box(reference));
		root_children.push(
			TileElement::new(state.base_error, Refine::Add, volume.clone()).with_content(format!(
				"../{}/{}.json",
				level_dir(child_level),
				child.name()
			)),
		);
	}

	let mut extent = union_all(boxes)?;
	if let Some(extents) = localized_extents(children.iter().copied(), reference) {
		extent = extent.union(&extents.to_box());
	}
	let error = root_children
		.iter()
		.map(|c| c.geometric_error)
		.fold(BASE_ERROR, f64::max);

	let mut root = TileElement::new(error, Refine::Add, BoundingVolume::region(reference, &extent));
	for child in root_children {
		root.add_child(child);
	}
	Some(Tileset::new(root))
}

fn tile_level0(
	ctx: &PipelineContext,
	level: &mut LodLevel,
	models: &HashMap<String, ModelInfo>,
	out_dir: &Path,
	reference: &GpsCoords,
) -> Result<()> {
	info!("[{}] Tiling {} cells of level 0", ctx.run_id, level.len());
	let dir = out_dir.join(level_dir(0));
	for tile in level.tiles_mut() {
		let tileset = match &*tile {
			Tile::Leaf { instances, .. } => leaf_tileset(tile, instances, models, reference)?,
			Tile::Aggregate { .. } => continue,
		};
		let dest = dir.join(format!("{}.json", tile.name()));
		match write_tileset(&tileset, &dest) {
			Ok(path) => tile.state_mut().path = Some(path),
			Err(err) => error!("[{}] Writing {} failed: {}", ctx.run_id, dest.display(), err),
		}
	}
	Ok(())
}

fn tile_level(
	ctx: &PipelineContext,
	level: &mut LodLevel,
	below: &LodLevel,
	out_dir: &Path,
	reference: &GpsCoords,
) {
	info!("[{}] Tiling {} tiles of level {}", ctx.run_id, level.len(), level.level);
	let dir = out_dir.join(level_dir(level.level));
	let child_level = below.level;
	for tile in level.tiles_mut() {
		let coords = match &*tile {
			Tile::Aggregate { children, .. } => children.clone(),
			Tile::Leaf { .. } => continue,
		};
		let children: Vec<&Tile> = below.children_of(&coords).collect();
		let tileset = match aggregate_tileset(&children, child_level, reference) {
			Some(tileset) => tileset,
			None => {
				warn!("[{}] Tile {} has no readable children", ctx.run_id, tile.name());
				continue;
			}
		};
		let dest = dir.join(format!("{}.json", tile.name()));
		match write_tileset(&tileset, &dest) {
			Ok(path) => tile.state_mut().path = Some(path),
			Err(err) => error!("[{}] Writing {} failed: {}", ctx.run_id, dest.display(), err),
		}
	}
}

fn load_level_information(level: &mut LodLevel, issues: &mut Vec<AssemblyIssue>) {
	for tile in level.tiles_mut() {
		if let Some(issue) = tile.load_file_information() {
			issues.push(issue);
		}
	}
}

/// Root transform of a tile: the offset to its parent's center, or the
/// absolute frame at the tile center when there is no usable parent.
pub fn stitch_transform(
	tile: &Tile,
	level: usize,
	parent: Option<&Tile>,
	reference: &GpsCoords,
	issues: &mut Vec<AssemblyIssue>,
) -> [f64; 16] {
	let center = tile.state().center;
	if center.is_none() {
		issues.push(AssemblyIssue::MissingCenter {
			tile: tile.name(),
			level,
		});
	}
	if let Some(parent) = parent {
		match (parent.state().center, center) {
			(Some(parent_center), Some(center)) => {
				return translation_matrix(&(parent_center - center));
			}
			(None, _) => issues.push(AssemblyIssue::MissingCenter {
				tile: parent.name(),
				level: level + 1,
			}),
			_ => {}
		}
	}
	reference
		.offset_by(&center.unwrap_or_default())
		.to_ecef_transform()
}

fn apply_transformations(
	ctx: &PipelineContext,
	levels: &[LodLevel],
	reference: &GpsCoords,
	block: i64,
	issues: &mut Vec<AssemblyIssue>,
) -> Result<()> {
	info!("[{}] Applying transformations", ctx.run_id);
	for (l, level) in levels.iter().enumerate() {
		let above = levels.get(l + 1);
		for tile in level.tiles() {
			let path = match &tile.state().path {
				Some(path) => path,
				None => continue,
			};
			let parent = above.and_then(|a| a.get(level.parent_of(tile.coord(), block)));
			if above.is_some() && parent.is_none() {
				warn!(
					"[{}] No parent for tile {} of level {}, using absolute transform",
					ctx.run_id,
					tile.name(),
					l
				);
				issues.push(AssemblyIssue::ParentNotFound {
					tile: tile.name(),
					level: l,
				});
			}
			let transform = stitch_transform(tile, l, parent, reference, issues);

			let mut tileset = read_tileset(path)?;
			tileset.root.transform = Some(transform);
			write_tileset(&tileset, path)?;
		}
	}
	Ok(())
}

fn write_root(levels: &[LodLevel], out_dir: &Path, reference: &GpsCoords) -> Result<PathBuf> {
	let top = levels
		.last()
		.ok_or_else(|| Error::InvalidInput("no grid levels".to_string()))?;
	let mut children = Vec::new();
	let mut boxes = Vec::new();
	for tile in top.tiles() {
		let state = tile.state();
		if let (Some(_), Some(volume)) = (&state.path, &state.bounding_volume) {
			boxes.push(volume.local_box(reference));
			children.push(
				TileElement::new(state.base_error, Refine::Add, volume.clone())
					.with_content(format!("{}/{}.json", level_dir(top.level), tile.name())),
			);
		}
	}
	let extent = union_all(boxes)
		.ok_or_else(|| Error::InvalidInput("no grid tile could be written".to_string()))?;
	let error = children
		.iter()
		.map(|c| c.geometric_error)
		.fold(BASE_ERROR, f64::max);

	let mut root = TileElement::new(error, Refine::Add, BoundingVolume::region(reference, &extent));
	for child in children {
		root.add_child(child);
	}
	write_tileset(&Tileset::new(root), &out_dir.join("tileset.json"))
}

/// Tiles placed instances into `LOD_{n}/{x}_{y}.json` tilesets, merging
/// blocks of cells per level, and writes the root `tileset.json`.
pub fn build_grid_pyramid(
	ctx: &PipelineContext,
	instances: &[Instance],
	models: &HashMap<String, ModelInfo>,
	out_dir: &Path,
	reference: &GpsCoords,
) -> Result<GridPyramid> {
	if let Some(missing) = instances.iter().find(|i| !models.contains_key(&i.kind)) {
		return Err(Error::InvalidInput(format!(
			"no model for instance type '{}'",
			missing.kind
		)));
	}

	let mut level0 = populate_level0(instances);
	if level0.is_empty() {
		return Err(Error::InvalidInput("no instances to tile".to_string()));
	}
	let (width, height) = level0.dimensions();
	let level_count = analyze_grid(width, height, BRANCH_FACTOR);
	let block = block_dim(BRANCH_FACTOR);
	info!(
		"[{}] Grid of {}x{} cells, {} levels above LOD0",
		ctx.run_id, width, height, level_count
	);

	let mut issues = Vec::new();
	tile_level0(ctx, &mut level0, models, out_dir, reference)?;
	load_level_information(&mut level0, &mut issues);

	let mut levels = vec![level0];
	for _ in 0..level_count {
		let below = match levels.last() {
			Some(level) => level,
			None => break,
		};
		let mut next = merge_up(below, block);
		tile_level(ctx, &mut next, below, out_dir, reference);
		load_level_information(&mut next, &mut issues);
		levels.push(next);
	}

	apply_transformations(ctx, &levels, reference, block, &mut issues)?;
	let root_path = write_root(&levels, out_dir, reference)?;
	info!("[{}] Wrote {}", ctx.run_id, root_path.display());

	Ok(GridPyramid {
		root_path,
		levels,
		issues,
	})
}
