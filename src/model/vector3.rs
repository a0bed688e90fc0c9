use std::ops;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Vector3 {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

impl Vector3 {
	pub fn new(x: f64, y: f64, z: f64) -> Vector3 {
		Vector3 { x, y, z }
	}

	pub fn empty() -> Vector3 {
		Vector3::new(0.0, 0.0, 0.0)
	}

	/// Component along `axis` (0 = x, 1 = y, 2 = z).
	pub fn get(&self, axis: usize) -> f64 {
		match axis {
			0 => self.x,
			1 => self.y,
			_ => self.z,
		}
	}

	pub fn lerp(&self, other: &Vector3, t: f64) -> Vector3 {
		Vector3 {
			x: self.x + (other.x - self.x) * t,
			y: self.y + (other.y - self.y) * t,
			z: self.z + (other.z - self.z) * t,
		}
	}

	pub fn dot(&self, other: &Vector3) -> f64 {
		self.x * other.x + self.y * other.y + self.z * other.z
	}

	pub fn cross(&self, other: &Vector3) -> Vector3 {
		Vector3 {
			x: self.y * other.z - self.z * other.y,
			y: self.z * other.x - self.x * other.z,
			z: self.x * other.y - self.y * other.x,
		}
	}

	pub fn length(&self) -> f64 {
		self.dot(self).sqrt()
	}

	/// Unit vector, or the input unchanged when its length is zero.
	pub fn normalized(&self) -> Vector3 {
		let len = self.length();
		if len > 0.0 {
			*self * (1.0 / len)
		} else {
			*self
		}
	}
}

impl ops::Mul<f64> for Vector3 {
	type Output = Vector3;

	fn mul(self, scalar: f64) -> Vector3 {
		Vector3 {
			x: self.x * scalar,
			y: self.y * scalar,
			z: self.z * scalar,
		}
	}
}

impl ops::Sub<Vector3> for Vector3 {
	type Output = Vector3;

	fn sub(self, _rhs: Vector3) -> Vector3 {
		Vector3 {
			x: self.x - _rhs.x,
			y: self.y - _rhs.y,
			z: self.z - _rhs.z,
		}
	}
}

impl ops::Add<Vector3> for Vector3 {
	type Output = Vector3;

	fn add(self, _rhs: Vector3) -> Vector3 {
		Vector3 {
			x: self.x + _rhs.x,
			y: self.y + _rhs.y,
			z: self.z + _rhs.z,
		}
	}
}
