/*!
This module defines `Shape` and `Layout`. A shape describes the element type and the extent of each dimension of an array, and its layout describes the order in which the dimensions are laid out in memory.
*/

use crate::{config::ShapeConfig, invalid_argument, ElementType, Error, Result};
use itertools::{izip, Itertools};

/// The physical order of the dimensions of an array. `minor_to_major[0]` is the dimension that varies fastest in memory and the last entry is the dimension that varies slowest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
	minor_to_major: Vec<usize>,
}

impl Layout {
	/// Create a layout, checking that `minor_to_major` is a permutation of `0..rank`.
	pub fn new(minor_to_major: &[usize], rank: usize) -> Result<Layout> {
		if minor_to_major.len() != rank {
			return Err(invalid_argument!(
				"layout {{{}}} has {} dimensions but the shape has rank {}",
				minor_to_major.iter().join(","),
				minor_to_major.len(),
				rank,
			));
		}
		let mut seen = vec![false; rank];
		for &dimension in minor_to_major {
			if dimension >= rank {
				return Err(invalid_argument!(
					"layout {{{}}} refers to dimension {} of a shape with rank {}",
					minor_to_major.iter().join(","),
					dimension,
					rank,
				));
			}
			if seen[dimension] {
				return Err(invalid_argument!(
					"layout {{{}}} lists dimension {} more than once",
					minor_to_major.iter().join(","),
					dimension,
				));
			}
			seen[dimension] = true;
		}
		Ok(Layout {
			minor_to_major: minor_to_major.to_owned(),
		})
	}

	/// The row major layout, in which the last dimension varies fastest.
	pub fn major_to_minor(rank: usize) -> Layout {
		Layout {
			minor_to_major: (0..rank).rev().collect(),
		}
	}

	pub fn minor_to_major(&self) -> &[usize] {
		&self.minor_to_major
	}
}

/// An array shape: an element type, the extent of each dimension, and a layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "ShapeConfig", into = "ShapeConfig")]
pub struct Shape {
	element_type: ElementType,
	dimensions: Vec<usize>,
	layout: Layout,
}

impl Shape {
	/// Create an array shape. If `minor_to_major` is `None`, the shape gets the row major layout.
	pub fn array_shape(
		element_type: ElementType,
		dimensions: &[usize],
		minor_to_major: Option<&[usize]>,
	) -> Result<Shape> {
		let layout = match minor_to_major {
			Some(minor_to_major) => Layout::new(minor_to_major, dimensions.len())?,
			None => Layout::major_to_minor(dimensions.len()),
		};
		Ok(Shape {
			element_type,
			dimensions: dimensions.to_owned(),
			layout,
		})
	}

	pub fn scalar(element_type: ElementType) -> Shape {
		Shape {
			element_type,
			dimensions: Vec::new(),
			layout: Layout::major_to_minor(0),
		}
	}

	/// Return a shape with the same element type and dimensions but a different layout.
	pub fn with_layout(&self, minor_to_major: &[usize]) -> Result<Shape> {
		Shape::array_shape(self.element_type, &self.dimensions, Some(minor_to_major))
	}

	pub fn element_type(&self) -> ElementType {
		self.element_type
	}

	pub fn dimensions(&self) -> &[usize] {
		&self.dimensions
	}

	pub fn layout(&self) -> &Layout {
		&self.layout
	}

	pub fn minor_to_major(&self) -> &[usize] {
		self.layout.minor_to_major()
	}

	pub fn rank(&self) -> usize {
		self.dimensions.len()
	}

	pub fn is_array(&self) -> bool {
		self.element_type.is_array()
	}

	pub fn element_count(&self) -> usize {
		self.dimensions.iter().product()
	}

	/// The number of bytes needed to store an array of this shape.
	pub fn byte_size(&self) -> Result<usize> {
		let element_size = self.element_type.byte_size().ok_or_else(|| {
			invalid_argument!("element type {} cannot be stored in an array", self.element_type)
		})?;
		self.dimensions
			.iter()
			.try_fold(element_size, |size, &dimension| size.checked_mul(dimension))
			.ok_or_else(|| {
				Error::ResourceExhausted(format!("the byte size of shape {} overflows usize", self))
			})
	}

	/**
	The stride of each logical dimension, in elements. The dimension at `minor_to_major[0]` has stride 1 and the stride of each following dimension is the stride of the one before it times that one's extent.
	*/
	pub fn strides(&self) -> Vec<usize> {
		let mut strides = vec![0; self.rank()];
		let mut stride: usize = 1;
		for &dimension in self.layout.minor_to_major.iter() {
			strides[dimension] = stride;
			stride = stride.saturating_mul(self.dimensions[dimension]);
		}
		strides
	}

	/// The stride of each logical dimension, in bytes.
	pub fn byte_strides(&self) -> Result<Vec<usize>> {
		let element_size = self.element_type.byte_size().ok_or_else(|| {
			invalid_argument!("element type {} cannot be stored in an array", self.element_type)
		})?;
		Ok(self
			.strides()
			.into_iter()
			.map(|stride| stride.saturating_mul(element_size))
			.collect())
	}

	/// The offset in elements of the element at `index`, or `None` if `index` is out of bounds.
	pub fn offset(&self, index: &[usize]) -> Option<usize> {
		if index.len() != self.rank() {
			return None;
		}
		let strides = self.strides();
		let mut offset = 0;
		for (extent, stride, index) in izip!(self.dimensions.iter(), strides.iter(), index.iter()) {
			if index >= extent {
				return None;
			}
			offset += stride * index;
		}
		Some(offset)
	}
}

/// Shapes print in XLA's text form, for example `f32[20,5]{1,0}`. Scalars print without a layout, as in `f32[]`.
impl std::fmt::Display for Shape {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"{}[{}]",
			self.element_type,
			self.dimensions.iter().join(",")
		)?;
		if self.rank() > 0 {
			write!(f, "{{{}}}", self.layout.minor_to_major.iter().join(","))?;
		}
		Ok(())
	}
}

impl std::str::FromStr for Shape {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		let open = s
			.find('[')
			.ok_or_else(|| invalid_argument!("expected \"[\" in shape \"{}\"", s))?;
		let close = s
			.find(']')
			.filter(|close| *close > open)
			.ok_or_else(|| invalid_argument!("expected \"]\" in shape \"{}\"", s))?;
		let element_type: ElementType = s[..open].trim().parse()?;
		let dimensions = parse_list(&s[open + 1..close], s)?;
		let rest = s[close + 1..].trim();
		let minor_to_major = if rest.is_empty() {
			None
		} else if rest.starts_with('{') && rest.ends_with('}') {
			Some(parse_list(&rest[1..rest.len() - 1], s)?)
		} else {
			return Err(invalid_argument!("unexpected \"{}\" in shape \"{}\"", rest, s));
		};
		Shape::array_shape(element_type, &dimensions, minor_to_major.as_deref())
	}
}

fn parse_list(list: &str, shape: &str) -> Result<Vec<usize>> {
	let list = list.trim();
	if list.is_empty() {
		return Ok(Vec::new());
	}
	list.split(',')
		.map(|item| {
			item.trim()
				.parse()
				.map_err(|_| invalid_argument!("invalid integer \"{}\" in shape \"{}\"", item, shape))
		})
		.collect()
}

impl std::convert::TryFrom<ShapeConfig> for Shape {
	type Error = Error;
	fn try_from(config: ShapeConfig) -> Result<Self, Self::Error> {
		config.into_shape()
	}
}

impl From<Shape> for ShapeConfig {
	fn from(shape: Shape) -> ShapeConfig {
		ShapeConfig {
			element_type: shape.element_type,
			dimensions: shape.dimensions,
			minor_to_major: Some(shape.layout.minor_to_major),
		}
	}
}

#[test]
fn test_default_layout_is_row_major() {
	let shape = Shape::array_shape(ElementType::F32, &[20, 5], None).unwrap();
	assert_eq!(shape.minor_to_major(), &[1, 0]);
	assert_eq!(shape.strides(), vec![5, 1]);
	assert_eq!(shape.byte_strides().unwrap(), vec![20, 4]);
	assert_eq!(shape.byte_size().unwrap(), 400);
}

#[test]
fn test_column_major_strides() {
	let shape = Shape::array_shape(ElementType::F32, &[25, 4], Some(&[0, 1])).unwrap();
	assert_eq!(shape.strides(), vec![1, 25]);
	assert_eq!(shape.offset(&[3, 2]), Some(53));
	assert_eq!(shape.offset(&[25, 0]), None);
	assert_eq!(shape.offset(&[0]), None);
}

#[test]
fn test_rank_3_strides() {
	let shape = Shape::array_shape(ElementType::S32, &[2, 3, 4], Some(&[1, 2, 0])).unwrap();
	// dimension 1 is fastest, then dimension 2, then dimension 0.
	assert_eq!(shape.strides(), vec![12, 1, 3]);
	assert_eq!(shape.offset(&[1, 2, 3]), Some(12 + 2 + 9));
}

#[test]
fn test_invalid_layouts() {
	let result = Shape::array_shape(ElementType::F32, &[2, 3], Some(&[0]));
	assert!(matches!(result, Err(Error::InvalidArgument(_))));
	let result = Shape::array_shape(ElementType::F32, &[2, 3], Some(&[0, 0]));
	assert!(matches!(result, Err(Error::InvalidArgument(_))));
	let result = Shape::array_shape(ElementType::F32, &[2, 3], Some(&[0, 2]));
	assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_scalar() {
	let shape = Shape::scalar(ElementType::F64);
	assert_eq!(shape.rank(), 0);
	assert_eq!(shape.element_count(), 1);
	assert_eq!(shape.byte_size().unwrap(), 8);
	assert_eq!(shape.offset(&[]), Some(0));
	assert_eq!(shape.to_string(), "f64[]");
}

#[test]
fn test_byte_size_overflow() {
	let shape = Shape::array_shape(ElementType::F64, &[usize::MAX, 2], None).unwrap();
	assert!(matches!(shape.byte_size(), Err(Error::ResourceExhausted(_))));
	let shape = Shape::array_shape(ElementType::Token, &[2], None).unwrap();
	assert!(matches!(shape.byte_size(), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_display_and_parse() {
	let shape = Shape::array_shape(ElementType::F32, &[20, 5], Some(&[1, 0])).unwrap();
	assert_eq!(shape.to_string(), "f32[20,5]{1,0}");
	let parsed: Shape = "f32[20,5]{1,0}".parse().unwrap();
	assert_eq!(parsed, shape);
	let parsed: Shape = "bf16[25, 4]{0, 1}".parse().unwrap();
	assert_eq!(parsed.minor_to_major(), &[0, 1]);
	let parsed: Shape = "s8[2,3,4]".parse().unwrap();
	assert_eq!(parsed.minor_to_major(), &[2, 1, 0]);
	assert!("f32".parse::<Shape>().is_err());
	assert!("f32[2,x]".parse::<Shape>().is_err());
	assert!("f32[2,3]{0}".parse::<Shape>().is_err());
	assert!("f32[2,3]1,0".parse::<Shape>().is_err());
}
