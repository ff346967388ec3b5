/*!
This crate implements the C API for literal, which is used by the bindings for each programming language to create literals and share them through DLPack. All functions return a status code which will be zero on success or non-zero on error. After an error, `literal_error_message` retrieves a description of it.
*/

#![allow(clippy::missing_safety_doc)]

use literal::{dlpack::DLManagedTensor, invalid_argument, ElementType, Literal, Result, Shape};
use std::{
	cell::RefCell,
	ffi::{CStr, CString},
	os::raw::c_char,
	panic::catch_unwind,
};

thread_local! {
	static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(message: String) {
	log::error!("{}", message);
	let message = CString::new(message.replace('\0', " ")).ok();
	LAST_ERROR.with(|last_error| *last_error.borrow_mut() = message);
}

fn status(result: std::thread::Result<Result<()>>) -> isize {
	match result {
		Ok(Ok(())) => 0,
		Ok(Err(error)) => {
			set_last_error(error.to_string());
			1
		}
		Err(_) => {
			set_last_error("a panic occurred".to_owned());
			2
		}
	}
}

unsafe fn read_str<'a>(string: *const u8) -> Result<&'a str> {
	if string.is_null() {
		return Err(invalid_argument!("string pointer is null"));
	}
	CStr::from_ptr(string as *const c_char)
		.to_str()
		.map_err(|_| invalid_argument!("string is not valid utf-8"))
}

unsafe fn write_out<T>(out: *mut T, value: T) -> Result<()> {
	if out.is_null() {
		return Err(invalid_argument!("output pointer is null"));
	}
	*out = value;
	Ok(())
}

fn into_c_string(string: String) -> Result<*const u8> {
	let string = CString::new(string).map_err(|_| invalid_argument!("string contains a nul byte"))?;
	Ok(CString::into_raw(string) as *const u8)
}

/// Retrieve the version of the library that is in use. On success, a pointer to the C string with the version will be written to `version_ptr`. You must call `literal_string_free` when you are done with it.
#[no_mangle]
pub extern "C" fn literal_version(version_ptr: *mut *const u8) -> isize {
	let result = catch_unwind(|| unsafe {
		let version = into_c_string(env!("CARGO_PKG_VERSION").to_owned())?;
		write_out(version_ptr, version)
	});
	status(result)
}

/// Retrieve the message of the last error on the calling thread. On success, a pointer to the C string with the message, or null if there has been no error, will be written to `message_ptr`. You must call `literal_string_free` on a non-null message when you are done with it.
#[no_mangle]
pub extern "C" fn literal_error_message(message_ptr: *mut *const u8) -> isize {
	let result = catch_unwind(|| unsafe {
		let message = LAST_ERROR.with(|last_error| last_error.borrow().clone());
		let message = match message {
			Some(message) => CString::into_raw(message) as *const u8,
			None => std::ptr::null(),
		};
		write_out(message_ptr, message)
	});
	match result {
		Ok(Ok(())) => 0,
		_ => 1,
	}
}

/**
Create an array shape. `element_type` is a C string with the name of the element type, such as `f32`. `dimensions` points to `rank` extents. `minor_to_major` is either null, for the row major layout, or points to `rank` dimension numbers. On success, a pointer to the shape will be written to `shape_ptr`. You must call `literal_shape_free` when you are done with it.
*/
#[no_mangle]
pub extern "C" fn literal_shape_new(
	element_type: *const u8,
	dimensions: *const usize,
	rank: usize,
	minor_to_major: *const usize,
	shape_ptr: *mut *mut Shape,
) -> isize {
	let result = catch_unwind(|| unsafe {
		let element_type: ElementType = read_str(element_type)?.parse()?;
		let dimensions: &[usize] = if rank == 0 {
			&[]
		} else if dimensions.is_null() {
			return Err(invalid_argument!("dimensions pointer is null"));
		} else {
			std::slice::from_raw_parts(dimensions, rank)
		};
		let minor_to_major = if minor_to_major.is_null() {
			None
		} else {
			Some(std::slice::from_raw_parts(minor_to_major, rank))
		};
		let shape = Shape::array_shape(element_type, dimensions, minor_to_major)?;
		write_out(shape_ptr, Box::into_raw(Box::new(shape)))
	});
	status(result)
}

/// Parse a shape from a C string in the text form `f32[20,5]{1,0}`. On success, a pointer to the shape will be written to `shape_ptr`. You must call `literal_shape_free` when you are done with it.
#[no_mangle]
pub extern "C" fn literal_shape_from_string(string: *const u8, shape_ptr: *mut *mut Shape) -> isize {
	let result = catch_unwind(|| unsafe {
		let shape: Shape = read_str(string)?.parse()?;
		write_out(shape_ptr, Box::into_raw(Box::new(shape)))
	});
	status(result)
}

/// Parse a shape from a C string of a json serialized shape config. On success, a pointer to the shape will be written to `shape_ptr`. You must call `literal_shape_free` when you are done with it.
#[no_mangle]
pub extern "C" fn literal_shape_from_json(json: *const u8, shape_ptr: *mut *mut Shape) -> isize {
	let result = catch_unwind(|| unsafe {
		let shape = literal::config::shape_from_json(read_str(json)?)?;
		write_out(shape_ptr, Box::into_raw(Box::new(shape)))
	});
	status(result)
}

/// Format a shape in its text form. On success, a pointer to the C string will be written to `string_ptr`. You must call `literal_string_free` when you are done with it.
#[no_mangle]
pub extern "C" fn literal_shape_to_string(shape: *const Shape, string_ptr: *mut *const u8) -> isize {
	let result = catch_unwind(|| unsafe {
		let shape = shape
			.as_ref()
			.ok_or_else(|| invalid_argument!("shape pointer is null"))?;
		write_out(string_ptr, into_c_string(shape.to_string())?)
	});
	status(result)
}

/// Free the shape pointed to by `shape`.
#[no_mangle]
pub extern "C" fn literal_shape_free(shape: *mut Shape) -> isize {
	let result = catch_unwind(|| unsafe {
		if !shape.is_null() {
			drop(Box::from_raw(shape));
		}
		Ok(())
	});
	status(result)
}

/// Allocate a zeroed literal with the shape pointed to by `shape`. The shape is copied, so it may be freed afterward. On success, a pointer to the literal will be written to `literal_ptr`. You must call `literal_free` when you are done with it.
#[no_mangle]
pub extern "C" fn literal_new(shape: *const Shape, literal_ptr: *mut *mut Literal) -> isize {
	let result = catch_unwind(|| unsafe {
		let shape = shape
			.as_ref()
			.ok_or_else(|| invalid_argument!("shape pointer is null"))?;
		let literal = Literal::new(shape.clone())?;
		write_out(literal_ptr, Box::into_raw(Box::new(literal)))
	});
	status(result)
}

/// Retrieve the literal's storage. On success, a pointer to the first byte will be written to `data_ptr` and the number of bytes to `len_ptr`. The bytes are in the literal's physical order and stay valid until the literal is freed. Each byte of a `pred` literal must remain 0 or 1.
#[no_mangle]
pub extern "C" fn literal_data(
	literal: *mut Literal,
	data_ptr: *mut *mut u8,
	len_ptr: *mut usize,
) -> isize {
	let result = catch_unwind(|| unsafe {
		let literal = literal
			.as_mut()
			.ok_or_else(|| invalid_argument!("literal pointer is null"))?;
		let bytes = literal.as_bytes_mut();
		write_out(len_ptr, bytes.len())?;
		write_out(data_ptr, bytes.as_mut_ptr())
	});
	status(result)
}

/// Export the literal through DLPack. On success, a pointer to a `DLManagedTensor` sharing the literal's storage will be written to `managed_ptr`. The consumer must call the tensor's deleter, which may happen before or after `literal_free`.
#[no_mangle]
pub extern "C" fn literal_to_dlpack(
	literal: *const Literal,
	managed_ptr: *mut *mut DLManagedTensor,
) -> isize {
	let result = catch_unwind(|| unsafe {
		let literal = literal
			.as_ref()
			.ok_or_else(|| invalid_argument!("literal pointer is null"))?;
		let tensor = literal.to_dlpack()?;
		if managed_ptr.is_null() {
			return Err(invalid_argument!("output pointer is null"));
		}
		write_out(managed_ptr, tensor.into_raw())
	});
	status(result)
}

/// Free the literal pointed to by `literal`. Storage shared with a DLPack export is released when the export's deleter runs.
#[no_mangle]
pub extern "C" fn literal_free(literal: *mut Literal) -> isize {
	let result = catch_unwind(|| unsafe {
		if !literal.is_null() {
			drop(Box::from_raw(literal));
		}
		Ok(())
	});
	status(result)
}

/// Free the C string created by this library pointed to by `string`.
#[no_mangle]
pub extern "C" fn literal_string_free(string: *mut u8) -> isize {
	let result = catch_unwind(|| unsafe {
		if !string.is_null() {
			drop(CString::from_raw(string as *mut c_char));
		}
		Ok(())
	});
	status(result)
}
