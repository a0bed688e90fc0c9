use crate::model::bounds::Box3;
use crate::model::vector3::Vector3;

// WGS84
const A: f64 = 6378137.0;
const F: f64 = 1.0 / 298.257223563;
const E2: f64 = F * (2.0 - F);

/// Position in the pipeline's local east-north-up frame, in metres.
pub type LocalCoords = Vector3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpsCoords {
	pub latitude: f64,
	pub longitude: f64,
	pub altitude: f64,
}

impl Default for GpsCoords {
	/// Reference used by the grid pipeline when no coordinates are given.
	fn default() -> Self {
		GpsCoords {
			latitude: 44.56573501069636,
			longitude: -123.27892951523633,
			altitude: 200.0,
		}
	}
}

impl GpsCoords {
	pub fn new(latitude: f64, longitude: f64, altitude: f64) -> GpsCoords {
		GpsCoords {
			latitude,
			longitude,
			altitude,
		}
	}

	fn prime_vertical_radius(&self) -> f64 {
		let sin_lat = self.latitude.to_radians().sin();
		A / (1.0 - E2 * sin_lat * sin_lat).sqrt()
	}

	fn meridian_radius(&self) -> f64 {
		let sin_lat = self.latitude.to_radians().sin();
		A * (1.0 - E2) / (1.0 - E2 * sin_lat * sin_lat).powf(1.5)
	}

	pub fn to_ecef(&self) -> Vector3 {
		let lat = self.latitude.to_radians();
		let lon = self.longitude.to_radians();
		let n = self.prime_vertical_radius();
		let h = self.altitude;
		Vector3::new(
			(n + h) * lat.cos() * lon.cos(),
			(n + h) * lat.cos() * lon.sin(),
			(n * (1.0 - E2) + h) * lat.sin(),
		)
	}

	/// Column-major 4x4 matrix taking east-north-up coordinates at this
	/// point to earth-centered earth-fixed coordinates.
	pub fn to_ecef_transform(&self) -> [f64; 16] {
		let lat = self.latitude.to_radians();
		let lon = self.longitude.to_radians();
		let east = Vector3::new(-lon.sin(), lon.cos(), 0.0);
		let north = Vector3::new(-lat.sin() * lon.cos(), -lat.sin() * lon.sin(), lat.cos());
		let up = Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());
		let origin = self.to_ecef();
		[
			east.x, east.y, east.z, 0.0,
			north.x, north.y, north.z, 0.0,
			up.x, up.y, up.z, 0.0,
			origin.x, origin.y, origin.z, 1.0,
		]
	}

	/// Moves the point by a local east-north-up offset using a tangent
	/// plane approximation.
	pub fn offset_by(&self, local: &LocalCoords) -> GpsCoords {
		let cos_lat = self.latitude.to_radians().cos();
		GpsCoords {
			latitude: self.latitude + (local.y / self.meridian_radius()).to_degrees(),
			longitude: self.longitude
				+ (local.x / (self.prime_vertical_radius() * cos_lat)).to_degrees(),
			altitude: self.altitude + local.z,
		}
	}

	/// Geographic region `[west, east, south, north, minHeight, maxHeight]`
	/// (radians, metres) covering a box given in the local frame.
	pub fn region_from_local(&self, local: &Box3) -> [f64; 6] {
		let lat = self.latitude.to_radians();
		let lon = self.longitude.to_radians();
		let lon_scale = self.prime_vertical_radius() * lat.cos();
		let lat_scale = self.meridian_radius();
		[
			lon + local.min.x / lon_scale,
			lon + local.max.x / lon_scale,
			lat + local.min.y / lat_scale,
			lat + local.max.y / lat_scale,
			self.altitude + local.min.z,
			self.altitude + local.max.z,
		]
	}

	/// Inverse of `region_from_local`.
	pub fn local_from_region(&self, region: &[f64; 6]) -> Box3 {
		let lat = self.latitude.to_radians();
		let lon = self.longitude.to_radians();
		let lon_scale = self.prime_vertical_radius() * lat.cos();
		let lat_scale = self.meridian_radius();
		Box3::new(
			(region[0] - lon) * lon_scale,
			(region[2] - lat) * lat_scale,
			region[4] - self.altitude,
			(region[1] - lon) * lon_scale,
			(region[3] - lat) * lat_scale,
			region[5] - self.altitude,
		)
	}
}

/// Column-major translation matrix.
pub fn translation_matrix(offset: &Vector3) -> [f64; 16] {
	[
		1.0, 0.0, 0.0, 0.0,
		0.0, 1.0, 0.0, 0.0,
		0.0, 0.0, 1.0, 0.0,
		offset.x, offset.y, offset.z, 1.0,
	]
}

#[cfg(test)]
mod tests {
	use super::{translation_matrix, GpsCoords};
	use crate::model::bounds::Box3;
	use crate::model::vector3::Vector3;
	use approx::assert_relative_eq;

	#[test]
	fn equator_prime_meridian_maps_to_x_axis() {
		let m = GpsCoords::new(0.0, 0.0, 0.0).to_ecef_transform();
		assert_relative_eq!(m[12], 6378137.0, epsilon = 1e-6);
		assert_relative_eq!(m[13], 0.0, epsilon = 1e-6);
		assert_relative_eq!(m[14], 0.0, epsilon = 1e-6);
		// east is +y, up is +x
		assert_relative_eq!(m[1], 1.0, epsilon = 1e-12);
		assert_relative_eq!(m[8], 1.0, epsilon = 1e-12);
		assert_eq!(m[15], 1.0);
	}

	#[test]
	fn frame_axes_are_orthonormal() {
		let m = GpsCoords::default().to_ecef_transform();
		let east = Vector3::new(m[0], m[1], m[2]);
		let north = Vector3::new(m[4], m[5], m[6]);
		let up = Vector3::new(m[8], m[9], m[10]);
		assert_relative_eq!(east.length(), 1.0, epsilon = 1e-12);
		assert_relative_eq!(north.length(), 1.0, epsilon = 1e-12);
		assert_relative_eq!(east.dot(&north), 0.0, epsilon = 1e-12);
		assert_relative_eq!(east.dot(&up), 0.0, epsilon = 1e-12);
		assert_relative_eq!(north.dot(&up), 0.0, epsilon = 1e-12);
	}

	#[test]
	fn region_round_trips_through_local_frame() {
		let gps = GpsCoords::default();
		let local = Box3::new(-10.0, -20.0, 0.0, 30.0, 40.0, 5.0);
		let region = gps.region_from_local(&local);
		assert!(region[0] < region[1] && region[2] < region[3]);
		assert_relative_eq!(region[4], 200.0);
		let back = gps.local_from_region(&region);
		assert_relative_eq!(back.min.x, -10.0, epsilon = 1e-6);
		assert_relative_eq!(back.max.y, 40.0, epsilon = 1e-6);
	}

	#[test]
	fn offset_moves_north_and_up() {
		let gps = GpsCoords::new(10.0, 20.0, 0.0);
		let moved = gps.offset_by(&Vector3::new(0.0, 1000.0, 5.0));
		assert!(moved.latitude > gps.latitude);
		assert_relative_eq!(moved.longitude, gps.longitude);
		assert_relative_eq!(moved.altitude, 5.0);
	}

	#[test]
	fn translation_is_in_last_column() {
		let m = translation_matrix(&Vector3::new(1.0, 2.0, 3.0));
		assert_eq!(&m[12..], &[1.0, 2.0, 3.0, 1.0]);
		assert_eq!(m[0], 1.0);
	}
}
