/*!
This module defines `Literal`, an array of elements in host memory with a fixed `Shape`. A literal's contents can be read and written through `ndarray` views that honor its layout, and they can be shared without copying through DLPack.
*/

use crate::{
	dlpack::{self, DLDevice, DlpackTensor},
	invalid_argument,
	storage::Storage,
	ElementType, NativeType, Result, Shape,
};
use itertools::izip;
use ndarray::prelude::*;
use ndarray::ShapeBuilder;
use std::{
	io::{Read, Write},
	path::Path,
	sync::Arc,
};

/// The version byte written before a serialized literal.
const MAJOR_VERSION: u8 = 0;

pub struct Literal {
	shape: Shape,
	storage: Arc<Storage>,
}

/// A serialized literal. `data` is encoded as a msgpack array of integers rather than a bin, so each byte of 128 or more takes two bytes in the file.
#[derive(serde::Serialize)]
struct SerializedLiteralRef<'a> {
	shape: &'a Shape,
	data: &'a [u8],
}

#[derive(serde::Deserialize)]
struct SerializedLiteral {
	shape: Shape,
	data: Vec<u8>,
}

impl Literal {
	/// Allocate a literal with the given shape. Its elements start out zeroed.
	pub fn new(shape: Shape) -> Result<Literal> {
		if !shape.is_array() {
			return Err(invalid_argument!(
				"cannot create a literal with element type {}",
				shape.element_type()
			));
		}
		let storage = Storage::zeroed(shape.byte_size()?)?;
		log::debug!("created literal {}", shape);
		Ok(Literal {
			shape,
			storage: Arc::new(storage),
		})
	}

	/// Create a literal with the shape and contents of `array`. If `minor_to_major` is `None`, the literal gets the row major layout.
	pub fn from_array<T, D>(array: ArrayView<T, D>, minor_to_major: Option<&[usize]>) -> Result<Literal>
	where
		T: NativeType,
		D: Dimension,
	{
		let shape = Shape::array_shape(T::ELEMENT_TYPE, array.shape(), minor_to_major)?;
		let mut literal = Literal::new(shape)?;
		literal.copy_from(array)?;
		Ok(literal)
	}

	pub fn shape(&self) -> &Shape {
		&self.shape
	}

	pub fn element_type(&self) -> ElementType {
		self.shape.element_type()
	}

	pub fn element_count(&self) -> usize {
		self.shape.element_count()
	}

	pub fn size_bytes(&self) -> usize {
		self.storage.len()
	}

	/// The literal's storage in physical order.
	pub fn as_bytes(&self) -> &[u8] {
		unsafe { std::slice::from_raw_parts(self.storage.as_ptr(), self.storage.len()) }
	}

	/**
	The literal's storage in physical order, for writing.

	# Safety

	Every byte written must leave each element a valid value of the literal's element type. In particular, the bytes of a `pred` literal must be 0 or 1, because views of it are arrays of `bool`.
	*/
	pub unsafe fn as_bytes_mut(&mut self) -> &mut [u8] {
		std::slice::from_raw_parts_mut(self.storage.as_ptr(), self.storage.len())
	}

	pub fn untyped_data_ptr(&self) -> *const u8 {
		self.storage.as_ptr()
	}

	/// View the literal's elements as an array. `T` must match the literal's element type.
	pub fn view<T>(&self) -> Result<ArrayViewD<T>>
	where
		T: NativeType,
	{
		self.check_native_type::<T>()?;
		let shape = IxDyn(self.shape.dimensions()).strides(IxDyn(&self.shape.strides()));
		log::trace!("viewing literal {} as {}", self.shape, T::ELEMENT_TYPE);
		let view = unsafe { ArrayViewD::from_shape_ptr(shape, self.storage.as_ptr() as *const T) };
		Ok(view)
	}

	/// View the literal's elements as a mutable array. Writes through the view go directly to the literal's storage.
	pub fn view_mut<T>(&mut self) -> Result<ArrayViewMutD<T>>
	where
		T: NativeType,
	{
		self.check_native_type::<T>()?;
		let shape = IxDyn(self.shape.dimensions()).strides(IxDyn(&self.shape.strides()));
		log::trace!("viewing literal {} mutably as {}", self.shape, T::ELEMENT_TYPE);
		let view = unsafe { ArrayViewMutD::from_shape_ptr(shape, self.storage.as_ptr() as *mut T) };
		Ok(view)
	}

	/// Copy `source` into the literal element by element. `source` must have the literal's element type and dimensions. On error, the literal is unchanged.
	pub fn copy_from<T, D>(&mut self, source: ArrayView<T, D>) -> Result<()>
	where
		T: NativeType,
		D: Dimension,
	{
		self.check_native_type::<T>()?;
		if source.shape() != self.shape.dimensions() {
			return Err(invalid_argument!(
				"cannot copy an array with dimensions {:?} into literal {}",
				source.shape(),
				self.shape
			));
		}
		self.view_mut::<T>()?.assign(&source);
		Ok(())
	}

	/// Copy the literal's elements into a new row major array.
	pub fn to_array<T>(&self) -> Result<ArrayD<T>>
	where
		T: NativeType,
	{
		Ok(self.view::<T>()?.to_owned())
	}

	/// Return a new literal with the same elements laid out according to `minor_to_major`.
	pub fn relayout(&self, minor_to_major: &[usize]) -> Result<Literal> {
		let shape = self.shape.with_layout(minor_to_major)?;
		let mut literal = Literal::new(shape)?;
		let element_size = literal.size_bytes() / literal.element_count().max(1);
		let source_strides = self.shape.strides();
		let destination_strides = literal.shape.strides();
		let source = self.as_bytes();
		// Whole elements are copied from a literal of the same element type.
		let destination = unsafe { literal.as_bytes_mut() };
		for index in ndarray::indices(self.shape.dimensions()) {
			let index = index.slice();
			let source_offset = linear_offset(index, &source_strides) * element_size;
			let destination_offset = linear_offset(index, &destination_strides) * element_size;
			destination[destination_offset..destination_offset + element_size]
				.copy_from_slice(&source[source_offset..source_offset + element_size]);
		}
		log::debug!("relayout {} to {}", self.shape, literal.shape);
		Ok(literal)
	}

	/// Export the literal through DLPack. The export aliases the literal's storage and keeps it alive until the export is dropped.
	pub fn to_dlpack(&self) -> Result<DlpackTensor> {
		dlpack::export(&self.shape, self.storage.clone())
	}

	pub fn dlpack_device(&self) -> DLDevice {
		DLDevice::cpu()
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		let mut bytes = vec![MAJOR_VERSION];
		self.write(&mut bytes)?;
		Ok(bytes)
	}

	pub fn from_slice(slice: &[u8]) -> Result<Literal> {
		let (major_version, slice) = slice
			.split_first()
			.ok_or_else(|| invalid_argument!("cannot read a literal from empty data"))?;
		if *major_version != MAJOR_VERSION {
			return Err(invalid_argument!("unknown major version {}", major_version));
		}
		let serialized: SerializedLiteral = rmp_serde::from_slice(slice)?;
		Literal::from_serialized(serialized)
	}

	pub fn from_path(path: &Path) -> Result<Literal> {
		let file = std::fs::File::open(path)?;
		let mut reader = std::io::BufReader::new(file);
		let mut major_version = [0u8; 1];
		reader.read_exact(&mut major_version)?;
		let major_version = major_version[0];
		if major_version != MAJOR_VERSION {
			return Err(invalid_argument!("unknown major version {}", major_version));
		}
		let serialized: SerializedLiteral = rmp_serde::from_read(&mut reader)?;
		Literal::from_serialized(serialized)
	}

	pub fn to_file(&self, path: &Path) -> Result<()> {
		let file = std::fs::File::create(path)?;
		let mut writer = std::io::BufWriter::new(file);
		writer.write_all(&[MAJOR_VERSION])?;
		self.write(&mut writer)?;
		writer.flush()?;
		Ok(())
	}

	fn write<W>(&self, writer: &mut W) -> Result<()>
	where
		W: Write,
	{
		let serialized = SerializedLiteralRef {
			shape: &self.shape,
			data: self.as_bytes(),
		};
		rmp_serde::encode::write_named(writer, &serialized)?;
		Ok(())
	}

	fn from_serialized(serialized: SerializedLiteral) -> Result<Literal> {
		let mut literal = Literal::new(serialized.shape)?;
		if serialized.data.len() != literal.size_bytes() {
			return Err(invalid_argument!(
				"literal {} needs {} bytes but {} were provided",
				literal.shape,
				literal.size_bytes(),
				serialized.data.len()
			));
		}
		if literal.element_type() == ElementType::Pred
			&& serialized.data.iter().any(|byte| *byte > 1)
		{
			return Err(invalid_argument!(
				"literal {} has a pred element that is neither 0 nor 1",
				literal.shape
			));
		}
		unsafe { literal.as_bytes_mut() }.copy_from_slice(&serialized.data);
		Ok(literal)
	}

	fn check_native_type<T>(&self) -> Result<()>
	where
		T: NativeType,
	{
		if T::ELEMENT_TYPE != self.shape.element_type() {
			return Err(invalid_argument!(
				"cannot view literal {} as {}",
				self.shape,
				T::ELEMENT_TYPE
			));
		}
		Ok(())
	}
}

fn linear_offset(index: &[usize], strides: &[usize]) -> usize {
	izip!(index, strides)
		.map(|(index, stride)| index * stride)
		.sum()
}

impl Literal {
	/// Copy the literal into newly allocated storage.
	pub fn try_clone(&self) -> Result<Literal> {
		let storage = Storage::zeroed(self.storage.len())?;
		unsafe {
			std::ptr::copy_nonoverlapping(self.storage.as_ptr(), storage.as_ptr(), storage.len());
		}
		Ok(Literal {
			shape: self.shape.clone(),
			storage: Arc::new(storage),
		})
	}
}

impl PartialEq for Literal {
	fn eq(&self, other: &Literal) -> bool {
		self.shape == other.shape && self.as_bytes() == other.as_bytes()
	}
}

impl std::fmt::Debug for Literal {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Literal")
			.field("shape", &format_args!("{}", self.shape))
			.field("size_bytes", &self.size_bytes())
			.finish()
	}
}

#[test]
fn test_new_is_zeroed() {
	let shape = Shape::array_shape(ElementType::S32, &[3, 4], None).unwrap();
	let literal = Literal::new(shape).unwrap();
	assert_eq!(literal.size_bytes(), 48);
	assert_eq!(literal.view::<i32>().unwrap(), Array::<i32, _>::zeros(IxDyn(&[3, 4])));
}

#[test]
fn test_non_array_element_type() {
	for element_type in &[
		ElementType::Invalid,
		ElementType::Tuple,
		ElementType::OpaqueType,
		ElementType::Token,
	] {
		let shape = Shape::array_shape(*element_type, &[2], None).unwrap();
		let result = Literal::new(shape);
		assert!(matches!(result, Err(crate::Error::InvalidArgument(_))));
	}
}

#[test]
fn test_view_type_mismatch() {
	let shape = Shape::array_shape(ElementType::F32, &[4], None).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	assert!(literal.view::<f64>().is_err());
	assert!(literal.view_mut::<i32>().is_err());
	assert!(literal.view::<f32>().is_ok());
}

#[test]
fn test_view_follows_layout() {
	let shape = Shape::array_shape(ElementType::U8, &[2, 3], Some(&[0, 1])).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	literal
		.view_mut::<u8>()
		.unwrap()
		.assign(&arr2(&[[1, 2, 3], [4, 5, 6]]));
	assert_eq!(literal.as_bytes(), &[1, 4, 2, 5, 3, 6]);
	assert_eq!(literal.view::<u8>().unwrap()[IxDyn(&[1, 2])], 6);
}

#[test]
fn test_copy_from_shape_mismatch() {
	let shape = Shape::array_shape(ElementType::F32, &[2, 2], None).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	let source = arr1(&[1.0f32, 2.0, 3.0, 4.0]);
	let result = literal.copy_from(source.view());
	assert!(matches!(result, Err(crate::Error::InvalidArgument(_))));
	assert!(literal.as_bytes().iter().all(|byte| *byte == 0));
	let source = arr2(&[[1i32, 2], [3, 4]]);
	assert!(literal.copy_from(source.view()).is_err());
}

#[test]
fn test_relayout() {
	let array = arr2(&[[1i16, 2, 3], [4, 5, 6]]);
	let row_major = Literal::from_array(array.view(), None).unwrap();
	let column_major = row_major.relayout(&[0, 1]).unwrap();
	assert_eq!(column_major.shape().minor_to_major(), &[0, 1]);
	assert_ne!(row_major.as_bytes(), column_major.as_bytes());
	assert_eq!(
		row_major.view::<i16>().unwrap(),
		column_major.view::<i16>().unwrap()
	);
	let values: Vec<i16> = column_major
		.as_bytes()
		.chunks(2)
		.map(|chunk| i16::from_ne_bytes([chunk[0], chunk[1]]))
		.collect();
	assert_eq!(values, vec![1, 4, 2, 5, 3, 6]);
}

#[test]
fn test_try_clone_is_deep() {
	let mut literal = Literal::from_array(arr1(&[1u32, 2, 3]).view(), None).unwrap();
	let copy = literal.try_clone().unwrap();
	literal.view_mut::<u32>().unwrap()[IxDyn(&[0])] = 10;
	assert_eq!(copy.view::<u32>().unwrap(), arr1(&[1u32, 2, 3]).into_dyn());
	assert_ne!(literal, copy);
}

#[test]
fn test_serialization() {
	let array = arr2(&[[0.5f64, 1.5], [2.5, 3.5]]);
	let literal = Literal::from_array(array.view(), Some(&[0, 1])).unwrap();
	let bytes = literal.to_bytes().unwrap();
	assert_eq!(bytes[0], 0);
	let restored = Literal::from_slice(&bytes).unwrap();
	assert_eq!(restored, literal);
	assert_eq!(restored.shape().to_string(), "f64[2,2]{0,1}");

	let mut bad_version = bytes.clone();
	bad_version[0] = 1;
	assert!(matches!(
		Literal::from_slice(&bad_version),
		Err(crate::Error::InvalidArgument(_))
	));
	assert!(Literal::from_slice(&[]).is_err());
	assert!(Literal::from_slice(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn test_pred_data_is_validated() {
	let literal = Literal::from_array(arr1(&[true, false]).view(), None).unwrap();
	let bytes = literal.to_bytes().unwrap();
	let restored = Literal::from_slice(&bytes).unwrap();
	assert_eq!(
		restored.view::<bool>().unwrap(),
		arr1(&[true, false]).into_dyn()
	);
	// The last byte of the file is the last element of the data.
	let mut corrupt = bytes.clone();
	*corrupt.last_mut().unwrap() = 2;
	assert!(matches!(
		Literal::from_slice(&corrupt),
		Err(crate::Error::InvalidArgument(_))
	));
}

#[test]
fn test_debug() {
	let shape = Shape::array_shape(ElementType::F32, &[10], None).unwrap();
	let literal = Literal::new(shape).unwrap();
	insta::assert_debug_snapshot!(literal, @r###"
 Literal {
     shape: f32[10]{0},
     size_bytes: 40,
 }
 "###);
}
