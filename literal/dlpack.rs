/*!
This module implements DLPack, the ABI used by array libraries to share tensors without copying. A literal exported with [`Literal::to_dlpack`](../struct.Literal.html#method.to_dlpack) hands out a `DLManagedTensor` whose data pointer is the literal's own storage, so every consumer of the export sees writes made through the literal and the other way around.
*/

use crate::{invalid_argument, storage::Storage, ElementType, NativeType, Result, Shape};
use ndarray::prelude::*;
use ndarray::ShapeBuilder;
use std::{convert::TryFrom, ffi::c_void, ptr::NonNull, sync::Arc};

pub const DLPACK_VERSION: u32 = 0x80;

pub mod device_type {
	pub const CPU: i32 = 1;
	pub const CUDA: i32 = 2;
	pub const CUDA_HOST: i32 = 3;
}

pub mod type_code {
	pub const INT: u8 = 0;
	pub const UINT: u8 = 1;
	pub const FLOAT: u8 = 2;
	pub const OPAQUE_HANDLE: u8 = 3;
	pub const BFLOAT: u8 = 4;
	pub const COMPLEX: u8 = 5;
	pub const BOOL: u8 = 6;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DLDevice {
	pub device_type: i32,
	pub device_id: i32,
}

impl DLDevice {
	pub fn cpu() -> DLDevice {
		DLDevice {
			device_type: device_type::CPU,
			device_id: 0,
		}
	}
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DLDataType {
	pub code: u8,
	pub bits: u8,
	pub lanes: u16,
}

#[repr(C)]
#[derive(Debug)]
pub struct DLTensor {
	pub data: *mut c_void,
	pub device: DLDevice,
	pub ndim: i32,
	pub dtype: DLDataType,
	pub shape: *mut i64,
	/// Strides in elements. A null pointer means the tensor is compact and row major.
	pub strides: *mut i64,
	pub byte_offset: u64,
}

#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensor {
	pub dl_tensor: DLTensor,
	pub manager_ctx: *mut c_void,
	pub deleter: Option<unsafe extern "C" fn(*mut DLManagedTensor)>,
}

impl std::convert::TryFrom<ElementType> for DLDataType {
	type Error = crate::Error;
	fn try_from(element_type: ElementType) -> Result<DLDataType> {
		let code = match element_type {
			ElementType::Pred => type_code::BOOL,
			ElementType::S8 | ElementType::S16 | ElementType::S32 | ElementType::S64 => {
				type_code::INT
			}
			ElementType::U8 | ElementType::U16 | ElementType::U32 | ElementType::U64 => {
				type_code::UINT
			}
			ElementType::F16 | ElementType::F32 | ElementType::F64 => type_code::FLOAT,
			ElementType::BF16 => type_code::BFLOAT,
			ElementType::C64 | ElementType::C128 => type_code::COMPLEX,
			ElementType::Invalid
			| ElementType::Tuple
			| ElementType::OpaqueType
			| ElementType::Token => {
				return Err(invalid_argument!(
					"element type {} has no DLPack equivalent",
					element_type
				))
			}
		};
		// Every array type has a byte size.
		let bits = element_type.byte_size().unwrap_or(0) * 8;
		Ok(DLDataType {
			code,
			bits: bits as u8,
			lanes: 1,
		})
	}
}

impl std::convert::TryFrom<DLDataType> for ElementType {
	type Error = crate::Error;
	fn try_from(dtype: DLDataType) -> Result<ElementType> {
		if dtype.lanes != 1 {
			return Err(invalid_argument!(
				"DLPack tensors with {} lanes are not supported",
				dtype.lanes
			));
		}
		let element_type = match (dtype.code, dtype.bits) {
			(type_code::BOOL, 8) => ElementType::Pred,
			(type_code::INT, 8) => ElementType::S8,
			(type_code::INT, 16) => ElementType::S16,
			(type_code::INT, 32) => ElementType::S32,
			(type_code::INT, 64) => ElementType::S64,
			(type_code::UINT, 8) => ElementType::U8,
			(type_code::UINT, 16) => ElementType::U16,
			(type_code::UINT, 32) => ElementType::U32,
			(type_code::UINT, 64) => ElementType::U64,
			(type_code::FLOAT, 16) => ElementType::F16,
			(type_code::FLOAT, 32) => ElementType::F32,
			(type_code::FLOAT, 64) => ElementType::F64,
			(type_code::BFLOAT, 16) => ElementType::BF16,
			(type_code::COMPLEX, 64) => ElementType::C64,
			(type_code::COMPLEX, 128) => ElementType::C128,
			(code, bits) => {
				return Err(invalid_argument!(
					"unsupported DLPack data type with code {} and {} bits",
					code,
					bits
				))
			}
		};
		Ok(element_type)
	}
}

/// The state owned by an exported `DLManagedTensor`. The shape and strides arrays live here so their pointers stay valid for the lifetime of the export.
struct ExportState {
	_storage: Arc<Storage>,
	_shape: Box<[i64]>,
	_strides: Box<[i64]>,
}

unsafe extern "C" fn delete_export(managed: *mut DLManagedTensor) {
	if managed.is_null() {
		return;
	}
	let managed = Box::from_raw(managed);
	if !managed.manager_ctx.is_null() {
		drop(Box::from_raw(managed.manager_ctx as *mut ExportState));
	}
	log::debug!("released DLPack export");
}

pub(crate) fn export(shape: &Shape, storage: Arc<Storage>) -> Result<DlpackTensor> {
	let dtype = DLDataType::try_from(shape.element_type())?;
	let ndim = i32::try_from(shape.rank())
		.map_err(|_| invalid_argument!("rank {} exceeds i32 range", shape.rank()))?;
	let dimensions = shape.dimensions().to_owned();
	let strides = shape.strides();
	let mut shape_i64 = to_i64(&dimensions)?;
	let mut strides_i64 = to_i64(&strides)?;
	let dl_tensor = DLTensor {
		data: storage.as_ptr() as *mut c_void,
		device: DLDevice::cpu(),
		ndim,
		dtype,
		shape: shape_i64.as_mut_ptr(),
		strides: strides_i64.as_mut_ptr(),
		byte_offset: 0,
	};
	let state = Box::new(ExportState {
		_storage: storage,
		_shape: shape_i64,
		_strides: strides_i64,
	});
	let managed = Box::new(DLManagedTensor {
		dl_tensor,
		manager_ctx: Box::into_raw(state) as *mut c_void,
		deleter: Some(delete_export),
	});
	log::debug!("exported {} through DLPack", shape);
	Ok(DlpackTensor {
		managed: NonNull::from(Box::leak(managed)),
		element_type: shape.element_type(),
		dimensions,
		strides,
	})
}

fn to_i64(values: &[usize]) -> Result<Box<[i64]>> {
	values
		.iter()
		.map(|value| {
			i64::try_from(*value).map_err(|_| invalid_argument!("{} exceeds i64 range", value))
		})
		.collect::<Result<Vec<_>>>()
		.map(Vec::into_boxed_slice)
}

fn to_usize(values: &[i64], what: &str) -> Result<Vec<usize>> {
	values
		.iter()
		.map(|value| {
			usize::try_from(*value)
				.map_err(|_| invalid_argument!("DLPack tensor has negative {} {}", what, value))
		})
		.collect()
}

/**
An owned `DLManagedTensor`. Dropping a `DlpackTensor` calls the tensor's deleter exactly once, unless ownership was handed off with [`into_raw`](#method.into_raw).

A `DlpackTensor` created by [`Literal::to_dlpack`](../struct.Literal.html#method.to_dlpack) shares its storage with the literal, and borrows of the literal do not extend to the tensor. That is why viewing the tensor is `unsafe`.
*/
pub struct DlpackTensor {
	managed: NonNull<DLManagedTensor>,
	element_type: ElementType,
	dimensions: Vec<usize>,
	strides: Vec<usize>,
}

impl DlpackTensor {
	/**
	Take ownership of a `DLManagedTensor` produced by another library. The tensor is consumed even if it is rejected, in which case its deleter has already been called.

	# Safety

	`managed` must be null or point to a valid `DLManagedTensor` that is not owned by anything else. Its shape and strides must describe elements that all lie inside the allocation behind its data pointer and byte offset, and every element must be a valid value of its data type, so each byte of a bool tensor must be 0 or 1. These must hold for as long as the tensor is owned.
	*/
	pub unsafe fn from_raw(managed: *mut DLManagedTensor) -> Result<DlpackTensor> {
		let managed = NonNull::new(managed)
			.ok_or_else(|| invalid_argument!("DLPack tensor pointer is null"))?;
		let mut tensor = DlpackTensor {
			managed,
			element_type: ElementType::Invalid,
			dimensions: Vec::new(),
			strides: Vec::new(),
		};
		let dl_tensor = &tensor.managed.as_ref().dl_tensor;
		if dl_tensor.device.device_type != device_type::CPU
			&& dl_tensor.device.device_type != device_type::CUDA_HOST
		{
			return Err(invalid_argument!(
				"DLPack tensor is on device type {}, only host tensors are supported",
				dl_tensor.device.device_type
			));
		}
		let element_type = ElementType::try_from(dl_tensor.dtype)?;
		let ndim = usize::try_from(dl_tensor.ndim)
			.map_err(|_| invalid_argument!("DLPack tensor has invalid ndim {}", dl_tensor.ndim))?;
		if ndim > 0 && dl_tensor.shape.is_null() {
			return Err(invalid_argument!("DLPack tensor has a null shape pointer"));
		}
		let dimensions = if ndim == 0 {
			Vec::new()
		} else {
			to_usize(std::slice::from_raw_parts(dl_tensor.shape, ndim), "extent")?
		};
		let strides = if dl_tensor.strides.is_null() {
			Shape::array_shape(element_type, &dimensions, None)?.strides()
		} else if ndim == 0 {
			Vec::new()
		} else {
			to_usize(std::slice::from_raw_parts(dl_tensor.strides, ndim), "stride")?
		};
		let element_count: usize = dimensions.iter().product();
		if element_count > 0 && dl_tensor.data.is_null() {
			return Err(invalid_argument!("DLPack tensor has a null data pointer"));
		}
		tensor.element_type = element_type;
		tensor.dimensions = dimensions;
		tensor.strides = strides;
		log::debug!(
			"imported DLPack tensor {}{:?}",
			tensor.element_type,
			tensor.dimensions
		);
		Ok(tensor)
	}

	/// Hand the tensor to a consumer, which becomes responsible for calling its deleter.
	pub fn into_raw(self) -> *mut DLManagedTensor {
		let managed = self.managed.as_ptr();
		std::mem::forget(self);
		managed
	}

	pub fn as_dl_tensor(&self) -> &DLTensor {
		unsafe { &self.managed.as_ref().dl_tensor }
	}

	pub fn device(&self) -> DLDevice {
		self.as_dl_tensor().device
	}

	pub fn element_type(&self) -> ElementType {
		self.element_type
	}

	pub fn dimensions(&self) -> &[usize] {
		&self.dimensions
	}

	/// The stride of each dimension, in elements.
	pub fn strides(&self) -> &[usize] {
		&self.strides
	}

	/**
	View the tensor's elements as an array. `T` must match the tensor's element type.

	# Safety

	The storage may be shared with a literal or with other consumers of the export. For as long as the view is alive, nothing may write to the elements it covers, including writes through the literal the tensor was exported from.
	*/
	pub unsafe fn view<T>(&self) -> Result<ArrayViewD<T>>
	where
		T: NativeType,
	{
		let ptr = self.data_ptr::<T>()?;
		let shape = IxDyn(&self.dimensions).strides(IxDyn(&self.strides));
		let view = ArrayViewD::from_shape_ptr(shape, ptr as *const T);
		Ok(view)
	}

	/**
	View the tensor's elements as a mutable array.

	# Safety

	For as long as the view is alive, nothing else may read or write the elements it covers, including through the literal the tensor was exported from or through another export of it.
	*/
	pub unsafe fn view_mut<T>(&mut self) -> Result<ArrayViewMutD<T>>
	where
		T: NativeType,
	{
		let ptr = self.data_ptr::<T>()?;
		let shape = IxDyn(&self.dimensions).strides(IxDyn(&self.strides));
		let view = ArrayViewMutD::from_shape_ptr(shape, ptr);
		Ok(view)
	}

	fn data_ptr<T>(&self) -> Result<*mut T>
	where
		T: NativeType,
	{
		if T::ELEMENT_TYPE != self.element_type {
			return Err(invalid_argument!(
				"cannot view a DLPack tensor of {} as {}",
				self.element_type,
				T::ELEMENT_TYPE
			));
		}
		let dl_tensor = self.as_dl_tensor();
		if self.dimensions.iter().product::<usize>() == 0 {
			return Ok(NonNull::<T>::dangling().as_ptr());
		}
		let byte_offset = usize::try_from(dl_tensor.byte_offset).map_err(|_| {
			invalid_argument!("byte offset {} exceeds usize range", dl_tensor.byte_offset)
		})?;
		let ptr = unsafe { (dl_tensor.data as *mut u8).add(byte_offset) } as *mut T;
		if ptr as usize % std::mem::align_of::<T>() != 0 {
			return Err(invalid_argument!(
				"DLPack tensor data is not aligned for {}",
				T::ELEMENT_TYPE
			));
		}
		Ok(ptr)
	}
}

impl Drop for DlpackTensor {
	fn drop(&mut self) {
		unsafe {
			if let Some(deleter) = self.managed.as_ref().deleter {
				deleter(self.managed.as_ptr());
			}
		}
	}
}

impl std::fmt::Debug for DlpackTensor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DlpackTensor")
			.field("element_type", &self.element_type)
			.field("dimensions", &self.dimensions)
			.field("strides", &self.strides)
			.field("device", &self.device())
			.finish()
	}
}

#[test]
fn test_dtype_mapping() {
	for element_type in &[
		ElementType::Pred,
		ElementType::S16,
		ElementType::U64,
		ElementType::F16,
		ElementType::BF16,
		ElementType::F32,
		ElementType::C128,
	] {
		let dtype = DLDataType::try_from(*element_type).unwrap();
		assert_eq!(ElementType::try_from(dtype).unwrap(), *element_type);
	}
	assert_eq!(
		DLDataType::try_from(ElementType::BF16).unwrap(),
		DLDataType {
			code: type_code::BFLOAT,
			bits: 16,
			lanes: 1
		}
	);
	assert!(DLDataType::try_from(ElementType::Token).is_err());
	let vectorized = DLDataType {
		code: type_code::FLOAT,
		bits: 32,
		lanes: 4,
	};
	assert!(ElementType::try_from(vectorized).is_err());
}

#[test]
fn test_export_descriptor() {
	let shape = Shape::array_shape(ElementType::F32, &[25, 4], Some(&[0, 1])).unwrap();
	let literal = crate::Literal::new(shape).unwrap();
	let tensor = literal.to_dlpack().unwrap();
	let dl_tensor = tensor.as_dl_tensor();
	assert_eq!(dl_tensor.data as *const u8, literal.untyped_data_ptr());
	assert_eq!(dl_tensor.ndim, 2);
	assert_eq!(dl_tensor.device, DLDevice::cpu());
	let shape = unsafe { std::slice::from_raw_parts(dl_tensor.shape, 2) };
	let strides = unsafe { std::slice::from_raw_parts(dl_tensor.strides, 2) };
	assert_eq!(shape, &[25i64, 4]);
	assert_eq!(strides, &[1i64, 25]);
	insta::assert_debug_snapshot!(tensor, @r###"
 DlpackTensor {
     element_type: F32,
     dimensions: [
         25,
         4,
     ],
     strides: [
         1,
         25,
     ],
     device: DLDevice {
         device_type: 1,
         device_id: 0,
     },
 }
 "###);
}

#[test]
fn test_raw_round_trip() {
	let mut literal = crate::Literal::from_array(arr1(&[1i64, 2, 3]).view(), None).unwrap();
	let raw = literal.to_dlpack().unwrap().into_raw();
	let tensor = unsafe { DlpackTensor::from_raw(raw) }.unwrap();
	literal.view_mut::<i64>().unwrap()[IxDyn(&[2])] = 30;
	unsafe {
		assert_eq!(tensor.view::<i64>().unwrap(), arr1(&[1i64, 2, 30]).into_dyn());
		assert!(tensor.view::<i32>().is_err());
	}
}

#[test]
fn test_export_outlives_literal() {
	let literal = crate::Literal::from_array(arr1(&[7u16, 8, 9]).view(), None).unwrap();
	let tensor = literal.to_dlpack().unwrap();
	drop(literal);
	let view = unsafe { tensor.view::<u16>() }.unwrap();
	assert_eq!(view, arr1(&[7u16, 8, 9]).into_dyn());
}

#[test]
fn test_from_raw_rejects_device() {
	let literal = crate::Literal::from_array(arr1(&[1.0f32]).view(), None).unwrap();
	let raw = literal.to_dlpack().unwrap().into_raw();
	unsafe {
		(*raw).dl_tensor.device.device_type = device_type::CUDA;
	}
	let result = unsafe { DlpackTensor::from_raw(raw) };
	assert!(matches!(result, Err(crate::Error::InvalidArgument(_))));
	assert!(unsafe { DlpackTensor::from_raw(std::ptr::null_mut()) }.is_err());
}

#[test]
fn test_from_raw_compact_strides() {
	let literal = crate::Literal::from_array(arr2(&[[1u8, 2, 3], [4, 5, 6]]).view(), None).unwrap();
	let raw = literal.to_dlpack().unwrap().into_raw();
	unsafe {
		(*raw).dl_tensor.strides = std::ptr::null_mut();
	}
	let tensor = unsafe { DlpackTensor::from_raw(raw) }.unwrap();
	assert_eq!(tensor.strides(), &[3, 1]);
	let view = unsafe { tensor.view::<u8>() }.unwrap();
	assert_eq!(view, arr2(&[[1u8, 2, 3], [4, 5, 6]]).into_dyn());
}

#[test]
fn test_views_alternate_with_literal_writes() {
	let mut literal = crate::Literal::from_array(arr1(&[0.0f32, 0.0]).view(), None).unwrap();
	let mut tensor = literal.to_dlpack().unwrap();
	{
		let view = unsafe { tensor.view::<f32>() }.unwrap();
		assert_eq!(view, arr1(&[0.0f32, 0.0]).into_dyn());
	}
	literal.view_mut::<f32>().unwrap()[IxDyn(&[0])] = 5.0;
	{
		let view = unsafe { tensor.view::<f32>() }.unwrap();
		assert_eq!(view, arr1(&[5.0f32, 0.0]).into_dyn());
	}
	unsafe { tensor.view_mut::<f32>() }.unwrap()[IxDyn(&[1])] = 6.0;
	assert_eq!(literal.to_array::<f32>().unwrap(), arr1(&[5.0f32, 6.0]).into_dyn());
}
