use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use log::warn;

use crate::csv_reader::Instance;
use crate::error::AssemblyIssue;
use crate::model::bounds::Box3;
use crate::model::coords::{GpsCoords, LocalCoords};
use crate::model::vector3::Vector3;
use crate::tiling::mesh_pyramid::BASE_ERROR;
use crate::tiling::tileset::{read_tileset, BoundingVolume};

pub const BRANCH_FACTOR: usize = 4;

pub type GridCoord = (i64, i64);

/// Side length of the block of child cells merged into one parent. Equals
/// `sqrt(branch_factor)` for square factors, rounded up otherwise.
pub fn block_dim(branch_factor: usize) -> i64 {
	((branch_factor as f64).sqrt().ceil() as i64).max(2)
}

/// Number of merge steps until the grid fits into a single tile. Divides by
/// the same block side that [`merge_up`] groups by, so the last level always
/// holds one tile.
pub fn analyze_grid(width: usize, height: usize, branch_factor: usize) -> usize {
	let block = block_dim(branch_factor) as f64;
	let mut dim = width.max(height) as f64;
	let mut levels = 0;
	while dim > 1.0 {
		dim = (dim / block).ceil();
		levels += 1;
	}
	levels
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileState {
	pub x: i64,
	pub y: i64,
	pub path: Option<PathBuf>,
	pub base_error: f64,
	pub bounding_volume: Option<BoundingVolume>,
	pub center: Option<LocalCoords>,
}

impl TileState {
	fn new(x: i64, y: i64) -> TileState {
		TileState {
			x,
			y,
			path: None,
			base_error: BASE_ERROR,
			bounding_volume: None,
			center: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tile {
	/// A LOD0 grid cell holding placed instances.
	Leaf { state: TileState, instances: Vec<Instance> },
	/// A merged tile referencing cells of the level below.
	Aggregate { state: TileState, children: Vec<GridCoord> },
}

impl Tile {
	pub fn state(&self) -> &TileState {
		match self {
			Tile::Leaf { state, .. } | Tile::Aggregate { state, .. } => state,
		}
	}

	pub fn state_mut(&mut self) -> &mut TileState {
		match self {
			Tile::Leaf { state, .. } | Tile::Aggregate { state, .. } => state,
		}
	}

	pub fn coord(&self) -> GridCoord {
		(self.state().x, self.state().y)
	}

	pub fn name(&self) -> String {
		format!("{}_{}", self.state().x, self.state().y)
	}

	/// Reads the tile's written tileset back to pick up its final error and
	/// volume. An unreadable file falls back to the base error and no volume.
	pub fn load_file_information(&mut self) -> Option<AssemblyIssue> {
		let name = self.name();
		let state = self.state_mut();
		let path = match &state.path {
			Some(path) => path.clone(),
			None => {
				state.base_error = BASE_ERROR;
				state.bounding_volume = None;
				return None;
			}
		};
		match read_tileset(&path) {
			Ok(tileset) => {
				state.base_error = tileset.geometric_error;
				state.bounding_volume = Some(tileset.root.bounding_volume);
				None
			}
			Err(err) => {
				warn!("Could not read {}: {}", path.display(), err);
				state.base_error = BASE_ERROR;
				state.bounding_volume = None;
				Some(AssemblyIssue::UnreadableContent { tile: name, path })
			}
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct LodLevel {
	pub level: usize,
	tiles: Vec<Tile>,
	index: HashMap<GridCoord, usize>,
}

impl LodLevel {
	pub fn new(level: usize) -> LodLevel {
		LodLevel {
			level,
			tiles: Vec::new(),
			index: HashMap::new(),
		}
	}

	pub fn push(&mut self, tile: Tile) {
		self.index.insert(tile.coord(), self.tiles.len());
		self.tiles.push(tile);
	}

	pub fn tiles(&self) -> &[Tile] {
		&self.tiles
	}

	pub fn tiles_mut(&mut self) -> &mut [Tile] {
		&mut self.tiles
	}

	pub fn get(&self, coord: GridCoord) -> Option<&Tile> {
		self.index.get(&coord).map(|&i| &self.tiles[i])
	}

	pub fn len(&self) -> usize {
		self.tiles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tiles.is_empty()
	}

	/// Lowest occupied x and y. Parent blocks are anchored here.
	pub fn origin(&self) -> Option<GridCoord> {
		let min_x = self.tiles.iter().map(|t| t.state().x).min()?;
		let min_y = self.tiles.iter().map(|t| t.state().y).min()?;
		Some((min_x, min_y))
	}

	/// Coordinate one level up of the block holding `coord`.
	pub fn parent_of(&self, coord: GridCoord, block: i64) -> GridCoord {
		parent_coord(coord, self.origin().unwrap_or(coord), block)
	}

	/// Width and height in cells of the occupied grid.
	pub fn dimensions(&self) -> (usize, usize) {
		let xs = self.tiles.iter().map(|t| t.state().x);
		let ys = self.tiles.iter().map(|t| t.state().y);
		match (xs.clone().min(), xs.max(), ys.clone().min(), ys.max()) {
			(Some(min_x), Some(max_x), Some(min_y), Some(max_y)) => {
				((max_x - min_x + 1) as usize, (max_y - min_y + 1) as usize)
			}
			_ => (0, 0),
		}
	}

	pub fn children_of<'a>(&'a self, coords: &'a [GridCoord]) -> impl Iterator<Item = &'a Tile> + 'a {
		coords.iter().filter_map(move |c| self.get(*c))
	}
}

/// One leaf per occupied cell, ordered by x then y. The leaf center is the
/// mean of its instance positions.
pub fn populate_level0(instances: &[Instance]) -> LodLevel {
	let mut cells: BTreeMap<GridCoord, Vec<Instance>> = BTreeMap::new();
	for instance in instances {
		cells.entry(instance.cell).or_default().push(instance.clone());
	}

	let mut level = LodLevel::new(0);
	for ((x, y), instances) in cells {
		let mut state = TileState::new(x, y);
		let sum = instances
			.iter()
			.fold(Vector3::empty(), |acc, i| acc + i.position);
		state.center = Some(sum * (1.0 / instances.len() as f64));
		level.push(Tile::Leaf { state, instances });
	}
	level
}

/// Running average over the children in order: the first child seeds the
/// accumulator, every further child is averaged in with equal weight to
/// everything before it.
pub fn progressive_center<'a>(children: impl IntoIterator<Item = &'a Tile>) -> Option<LocalCoords> {
	let mut acc: Option<LocalCoords> = None;
	for child in children {
		if let Some(center) = child.state().center {
			acc = Some(match acc {
				None => center,
				Some(acc) => (acc + center) * 0.5,
			});
		}
	}
	acc
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
	pub min_x: f64,
	pub max_x: f64,
	pub min_y: f64,
	pub max_y: f64,
	pub min_z: f64,
	pub max_z: f64,
	/// Per-axis minimum child center subtracted before taking extrema.
	pub origin: LocalCoords,
}

impl Extents {
	/// The extents moved back out of the localized frame.
	pub fn to_box(&self) -> Box3 {
		Box3::new(self.min_x, self.min_y, self.min_z, self.max_x, self.max_y, self.max_z)
			.translated(self.origin)
	}
}

/// Extrema of the children's volumes around their localized centers.
/// Children without a center or volume do not contribute.
pub fn localized_extents<'a>(
	children: impl IntoIterator<Item = &'a Tile>,
	reference: &GpsCoords,
) -> Option<Extents> {
	let placed: Vec<(LocalCoords, [f64; 3])> = children
		.into_iter()
		.filter_map(|t| {
			let state = t.state();
			let center = state.center?;
			let volume = state.bounding_volume.as_ref()?;
			Some((center, volume.half_extents(reference)))
		})
		.collect();
	if placed.is_empty() {
		return None;
	}

	let origin = placed.iter().fold(
		Vector3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
		|acc, (c, _)| Vector3::new(acc.x.min(c.x), acc.y.min(c.y), acc.z.min(c.z)),
	);

	let mut extents = Extents {
		min_x: f64::INFINITY,
		max_x: f64::NEG_INFINITY,
		min_y: f64::INFINITY,
		max_y: f64::NEG_INFINITY,
		min_z: f64::INFINITY,
		max_z: f64::NEG_INFINITY,
		origin,
	};
	for (center, half) in placed {
		let local = center - origin;
		extents.min_x = extents.min_x.min(local.x - half[0]);
		extents.max_x = extents.max_x.max(local.x + half[0]);
		extents.min_y = extents.min_y.min(local.y - half[1]);
		extents.max_y = extents.max_y.max(local.y + half[1]);
		extents.min_z = extents.min_z.min(local.z - half[2]);
		extents.max_z = extents.max_z.max(local.z + half[2]);
	}
	Some(extents)
}

/// Parent cell of `coord` when merging blocks of `block` cells that start
/// at `origin`. The parent of the block at `origin + k * block` is
/// `floor(origin / block) + k`.
pub fn parent_coord(coord: GridCoord, origin: GridCoord, block: i64) -> GridCoord {
	(
		origin.0.div_euclid(block) + (coord.0 - origin.0).div_euclid(block),
		origin.1.div_euclid(block) + (coord.1 - origin.1).div_euclid(block),
	)
}

/// Merges blocks of `block` x `block` tiles into aggregates one level up.
/// Blocks start at the lowest occupied cell of `level`. Children keep the
/// order of the lower level; missing cells are omitted.
pub fn merge_up(level: &LodLevel, block: i64) -> LodLevel {
	let mut groups: BTreeMap<GridCoord, Vec<GridCoord>> = BTreeMap::new();
	for tile in level.tiles() {
		groups
			.entry(level.parent_of(tile.coord(), block))
			.or_default()
			.push(tile.coord());
	}

	let mut merged = LodLevel::new(level.level + 1);
	for ((x, y), children) in groups {
		let mut state = TileState::new(x, y);
		state.center = progressive_center(level.children_of(&children));
		merged.push(Tile::Aggregate { state, children });
	}
	merged
}

#[cfg(test)]
mod tests {
	use super::{
		analyze_grid, block_dim, localized_extents, merge_up, parent_coord, populate_level0,
		progressive_center, LodLevel, Tile, TileState,
	};
	use crate::csv_reader::Instance;
	use crate::error::AssemblyIssue;
	use crate::model::coords::{GpsCoords, LocalCoords};
	use crate::model::bounds::Box3;
	use crate::tiling::tileset::BoundingVolume;
	use approx::assert_relative_eq;
	use std::fs;

	fn leaf(x: i64, y: i64, center: (f64, f64)) -> Tile {
		Tile::Leaf {
			state: TileState {
				center: Some(LocalCoords::new(center.0, center.1, 0.0)),
				..TileState::new(x, y)
			},
			instances: Vec::new(),
		}
	}

	#[test]
	fn counts_levels() {
		assert_eq!(analyze_grid(1, 1, 4), 0);
		assert_eq!(analyze_grid(2, 2, 4), 1);
		assert_eq!(analyze_grid(3, 1, 4), 2);
		assert_eq!(analyze_grid(8, 5, 4), 3);
		assert_eq!(analyze_grid(9, 9, 9), 2);
	}

	#[test]
	fn non_square_factor_counts_with_the_merge_block() {
		assert_eq!(block_dim(1), 2);
		assert_eq!(block_dim(5), 3);
		assert_eq!(analyze_grid(4, 4, 1), 2);
		assert_eq!(analyze_grid(9, 1, 5), 2);

		let mut level = LodLevel::new(0);
		for x in 0..9 {
			level.push(leaf(x, 0, (x as f64, 0.0)));
		}
		let block = block_dim(5);
		for _ in 0..analyze_grid(9, 1, 5) {
			level = merge_up(&level, block);
		}
		assert_eq!(level.len(), 1);
	}

	#[test]
	fn two_by_two_merges_into_progressive_center() {
		let mut level = LodLevel::new(0);
		level.push(leaf(0, 0, (0.0, 0.0)));
		level.push(leaf(1, 0, (2.0, 0.0)));
		level.push(leaf(0, 1, (0.0, 2.0)));
		level.push(leaf(1, 1, (2.0, 2.0)));

		let merged = merge_up(&level, 2);
		assert_eq!(merged.level, 1);
		assert_eq!(merged.len(), 1);
		let parent = &merged.tiles()[0];
		assert_eq!(parent.coord(), (0, 0));
		let center = parent.state().center.unwrap();
		// a true centroid would be (1, 1)
		assert_relative_eq!(center.x, 1.25);
		assert_relative_eq!(center.y, 1.5);

		match parent {
			Tile::Aggregate { children, .. } => {
				assert_eq!(children, &vec![(0, 0), (1, 0), (0, 1), (1, 1)])
			}
			Tile::Leaf { .. } => panic!("expected an aggregate"),
		}
	}

	#[test]
	fn merge_skips_missing_cells_and_handles_negative_coords() {
		let mut level = LodLevel::new(2);
		level.push(leaf(-1, 0, (0.0, 0.0)));
		level.push(leaf(0, 0, (4.0, 0.0)));
		level.push(leaf(3, 3, (8.0, 8.0)));
		let merged = merge_up(&level, 2);
		let coords: Vec<_> = merged.tiles().iter().map(|t| t.coord()).collect();
		// blocks start at x = -1: {-1, 0} and {3}
		assert_eq!(coords, vec![(-1, 0), (1, 1)]);
		assert_eq!(level.parent_of((0, 0), 2), (-1, 0));
		assert!(merged.get((1, 1)).is_some());
		assert!(merged.get((5, 5)).is_none());
		match &merged.tiles()[0] {
			Tile::Aggregate { children, .. } => assert_eq!(children, &vec![(-1, 0), (0, 0)]),
			Tile::Leaf { .. } => panic!("expected an aggregate"),
		}
	}

	#[test]
	fn blocks_start_at_the_lowest_occupied_cell() {
		let mut level = LodLevel::new(0);
		level.push(leaf(1, 0, (0.0, 0.0)));
		level.push(leaf(2, 0, (4.0, 0.0)));
		assert_eq!(level.origin(), Some((1, 0)));
		let (width, height) = level.dimensions();
		assert_eq!(analyze_grid(width, height, 4), 1);

		let merged = merge_up(&level, 2);
		assert_eq!(merged.len(), 1);
		assert_eq!(merged.tiles()[0].coord(), (0, 0));
		assert_eq!(parent_coord((3, 5), (1, 0), 2), (1, 2));
		assert_eq!(parent_coord((-3, 0), (-3, 0), 2), (-2, 0));
	}

	#[test]
	fn unreadable_tileset_falls_back_and_still_merges() -> Result<(), Box<dyn std::error::Error>> {
		let dir = tempfile::tempdir()?;
		let lod0 = dir.path().join("LOD_0");
		fs::create_dir_all(&lod0)?;
		let corrupt = lod0.join("0_0.json");
		fs::write(&corrupt, "{ \"asset\": ")?;

		let mut broken = leaf(0, 0, (0.0, 0.0));
		{
			let state = broken.state_mut();
			state.path = Some(corrupt.clone());
			state.base_error = 7.0;
			state.bounding_volume = Some(BoundingVolume::from_local_box(&Box3::new(
				0.0, 0.0, 0.0, 1.0, 1.0, 1.0,
			)));
		}
		let issue = broken.load_file_information();
		assert_eq!(
			issue,
			Some(AssemblyIssue::UnreadableContent {
				tile: "0_0".to_string(),
				path: corrupt,
			})
		);
		assert_eq!(broken.state().base_error, 100.0);
		assert!(broken.state().bounding_volume.is_none());

		let mut level = LodLevel::new(0);
		level.push(broken);
		level.push(leaf(1, 0, (2.0, 0.0)));
		let merged = merge_up(&level, 2);
		assert_eq!(merged.len(), 1);
		assert_eq!(merged.tiles()[0].state().center, Some(LocalCoords::new(1.0, 0.0, 0.0)));
		Ok(())
	}

	#[test]
	fn leaf_center_is_instance_mean() {
		let instance = |x: f64, y: f64, cell: (i64, i64)| Instance {
			kind: "tree".to_string(),
			position: LocalCoords::new(x, y, 1.0),
			cell,
		};
		let level = populate_level0(&[
			instance(0.0, 0.0, (1, 0)),
			instance(4.0, 2.0, (1, 0)),
			instance(9.0, 9.0, (0, 3)),
		]);
		assert_eq!(level.len(), 2);
		assert_eq!(level.tiles()[0].coord(), (0, 3));
		let center = level.get((1, 0)).unwrap().state().center.unwrap();
		assert_eq!(center, LocalCoords::new(2.0, 1.0, 1.0));
		assert_eq!(level.dimensions(), (2, 4));
	}

	#[test]
	fn extents_use_localized_centers() {
		let reference = GpsCoords::default();
		let with_volume = |x: f64, y: f64, half: f64| {
			let mut tile = leaf(0, 0, (x, y));
			let state = tile.state_mut();
			state.bounding_volume = Some(BoundingVolume::from_local_box(&Box3::new(
				x - half,
				y - half,
				-half,
				x + half,
				y + half,
				half,
			)));
			tile
		};
		let tiles = vec![with_volume(10.0, 20.0, 1.0), with_volume(14.0, 20.0, 2.0), leaf(1, 1, (50.0, 50.0))];

		let extents = localized_extents(tiles.iter(), &reference).unwrap();
		assert_relative_eq!(extents.min_x, -1.0);
		assert_relative_eq!(extents.max_x, 6.0);
		assert_relative_eq!(extents.min_y, -2.0);
		assert_relative_eq!(extents.max_y, 2.0);
		assert_eq!(extents.origin, LocalCoords::new(10.0, 20.0, 0.0));
		assert_eq!(extents.to_box(), Box3::new(9.0, 18.0, -2.0, 16.0, 22.0, 2.0));

		assert!(progressive_center(tiles.iter()).is_some());
		assert!(localized_extents(tiles[2..].iter(), &reference).is_none());
	}
}
