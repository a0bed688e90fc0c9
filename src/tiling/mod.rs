pub mod grid;
pub mod grid_pyramid;
pub mod mesh_pyramid;
pub mod tileset;
