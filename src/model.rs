pub mod bounds;
pub mod coords;
pub mod mesh;
pub mod options;
pub mod vector3;
