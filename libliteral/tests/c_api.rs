use literal::{DlpackTensor, Literal, Shape};
use literal_c::*;
use ndarray::prelude::*;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

unsafe fn take_string(string: *const u8) -> String {
	let value = CStr::from_ptr(string as *const c_char)
		.to_str()
		.unwrap()
		.to_owned();
	assert_eq!(literal_string_free(string as *mut u8), 0);
	value
}

fn last_error() -> String {
	let mut message = std::ptr::null();
	assert_eq!(literal_error_message(&mut message), 0);
	assert!(!message.is_null());
	unsafe { take_string(message) }
}

#[test]
fn test_version() {
	let mut version = std::ptr::null();
	assert_eq!(literal_version(&mut version), 0);
	assert_eq!(unsafe { take_string(version) }, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_literal_through_dlpack() {
	let element_type = CString::new("f32").unwrap();
	let dimensions = [25usize, 4];
	let minor_to_major = [0usize, 1];
	let mut shape: *mut Shape = std::ptr::null_mut();
	let status = literal_shape_new(
		element_type.as_ptr() as *const u8,
		dimensions.as_ptr(),
		dimensions.len(),
		minor_to_major.as_ptr(),
		&mut shape,
	);
	assert_eq!(status, 0);

	let mut string = std::ptr::null();
	assert_eq!(literal_shape_to_string(shape, &mut string), 0);
	assert_eq!(unsafe { take_string(string) }, "f32[25,4]{0,1}");

	let mut literal: *mut Literal = std::ptr::null_mut();
	assert_eq!(literal_new(shape, &mut literal), 0);
	assert_eq!(literal_shape_free(shape), 0);

	let mut managed = std::ptr::null_mut();
	assert_eq!(literal_to_dlpack(literal, &mut managed), 0);
	let mut tensor = unsafe { DlpackTensor::from_raw(managed) }.unwrap();
	let input = Array::range(0.0f32, 100.0, 1.0).into_shape((25, 4)).unwrap();
	unsafe { tensor.view_mut::<f32>() }.unwrap().assign(&input);

	let mut data = std::ptr::null_mut();
	let mut len = 0;
	assert_eq!(literal_data(literal, &mut data, &mut len), 0);
	assert_eq!(len, 400);
	let bytes = unsafe { std::slice::from_raw_parts(data, len) };
	// Column major, so the second float in memory is row 1 of column 0.
	assert_eq!(f32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 4.0);

	// The export keeps the storage alive after the literal is freed.
	assert_eq!(literal_free(literal), 0);
	let view = unsafe { tensor.view::<f32>() }.unwrap();
	assert_eq!(view, input.into_dyn());
}

#[test]
fn test_shape_from_string_and_json() {
	let text = CString::new("s32[2,3]{0,1}").unwrap();
	let mut from_string: *mut Shape = std::ptr::null_mut();
	assert_eq!(
		literal_shape_from_string(text.as_ptr() as *const u8, &mut from_string),
		0
	);
	let json = CString::new(r#"{ "element_type": "s32", "dimensions": [2, 3], "minor_to_major": [0, 1] }"#)
		.unwrap();
	let mut from_json: *mut Shape = std::ptr::null_mut();
	assert_eq!(
		literal_shape_from_json(json.as_ptr() as *const u8, &mut from_json),
		0
	);
	unsafe {
		assert_eq!(*from_string, *from_json);
	}
	assert_eq!(literal_shape_free(from_string), 0);
	assert_eq!(literal_shape_free(from_json), 0);
}

#[test]
fn test_errors() {
	let element_type = CString::new("f32").unwrap();
	let dimensions = [2usize, 3];
	let minor_to_major = [1usize, 1];
	let mut shape: *mut Shape = std::ptr::null_mut();
	let status = literal_shape_new(
		element_type.as_ptr() as *const u8,
		dimensions.as_ptr(),
		dimensions.len(),
		minor_to_major.as_ptr(),
		&mut shape,
	);
	assert_eq!(status, 1);
	assert!(shape.is_null());
	assert!(last_error().contains("more than once"));

	let token = CString::new("token[2]").unwrap();
	assert_eq!(
		literal_shape_from_string(token.as_ptr() as *const u8, &mut shape),
		0
	);
	let mut literal: *mut Literal = std::ptr::null_mut();
	assert_eq!(literal_new(shape, &mut literal), 1);
	assert!(literal.is_null());
	assert!(last_error().starts_with("invalid argument"));
	assert_eq!(literal_shape_free(shape), 0);

	assert_eq!(literal_new(std::ptr::null(), &mut literal), 1);
}
