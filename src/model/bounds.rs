use crate::model::vector3::Vector3;
use ord_subset::OrdSubsetIterExt;

/// Axis aligned box. Zero volume boxes are valid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3 {
	pub min: Vector3,
	pub max: Vector3,
}

impl Box3 {
	pub fn new(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> Box3 {
		Box3 {
			min: Vector3::new(min_x, min_y, min_z),
			max: Vector3::new(max_x, max_y, max_z),
		}
	}

	pub fn from_points<'a, I>(points: I) -> Option<Box3>
	where
		I: IntoIterator<Item = &'a Vector3>,
		I::IntoIter: Clone,
	{
		let points = points.into_iter();
		let xs = points.clone().map(|p| p.x);
		let ys = points.clone().map(|p| p.y);
		let zs = points.map(|p| p.z);

		Some(Box3::new(
			xs.clone().ord_subset_min()?,
			ys.clone().ord_subset_min()?,
			zs.clone().ord_subset_min()?,
			xs.ord_subset_max()?,
			ys.ord_subset_max()?,
			zs.ord_subset_max()?,
		))
	}

	pub fn width(&self) -> f64 {
		self.max.x - self.min.x
	}

	pub fn height(&self) -> f64 {
		self.max.y - self.min.y
	}

	pub fn depth(&self) -> f64 {
		self.max.z - self.min.z
	}

	pub fn center(&self) -> Vector3 {
		Vector3::new(
			(self.min.x + self.max.x) / 2.0,
			(self.min.y + self.max.y) / 2.0,
			(self.min.z + self.max.z) / 2.0,
		)
	}

	pub fn half_extents(&self) -> [f64; 3] {
		[self.width() / 2.0, self.height() / 2.0, self.depth() / 2.0]
	}

	pub fn diagonal(&self) -> f64 {
		(self.max - self.min).length()
	}

	pub fn union(&self, other: &Box3) -> Box3 {
		Box3::new(
			self.min.x.min(other.min.x),
			self.min.y.min(other.min.y),
			self.min.z.min(other.min.z),
			self.max.x.max(other.max.x),
			self.max.y.max(other.max.y),
			self.max.z.max(other.max.z),
		)
	}

	/// True when `other` lies within this box, allowing `eps` of slack.
	pub fn contains(&self, other: &Box3, eps: f64) -> bool {
		other.min.x >= self.min.x - eps
			&& other.min.y >= self.min.y - eps
			&& other.min.z >= self.min.z - eps
			&& other.max.x <= self.max.x + eps
			&& other.max.y <= self.max.y + eps
			&& other.max.z <= self.max.z + eps
	}

	pub fn translated(&self, offset: Vector3) -> Box3 {
		Box3 {
			min: self.min + offset,
			max: self.max + offset,
		}
	}

	/// Splits the box on `axis` at `value`, returning the lower and upper halves.
	pub fn split_at(&self, axis: usize, value: f64) -> (Box3, Box3) {
		let mut lower = *self;
		let mut upper = *self;
		match axis {
			0 => {
				lower.max.x = value;
				upper.min.x = value;
			}
			1 => {
				lower.max.y = value;
				upper.min.y = value;
			}
			_ => {
				lower.max.z = value;
				upper.min.z = value;
			}
		}
		(lower, upper)
	}
}
