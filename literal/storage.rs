use crate::{Error, Result};
use std::{
	alloc::{alloc_zeroed, dealloc, Layout},
	ptr::NonNull,
};

/// Storage is aligned for every element type, including `c128`, and to a cache line.
pub const ALIGNMENT: usize = 64;

/// A zeroed, aligned block of host memory. A `Storage` is shared through an `Arc` by the literal that allocated it and by any DLPack exports of that literal. Writers sharing one block must synchronize externally.
pub(crate) struct Storage {
	ptr: NonNull<u8>,
	len: usize,
}

unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
	pub fn zeroed(len: usize) -> Result<Storage> {
		if len == 0 {
			let ptr = unsafe { NonNull::new_unchecked(ALIGNMENT as *mut u8) };
			return Ok(Storage { ptr, len });
		}
		let layout = Layout::from_size_align(len, ALIGNMENT).map_err(|_| {
			Error::ResourceExhausted(format!("cannot allocate a block of {} bytes", len))
		})?;
		let ptr = unsafe { alloc_zeroed(layout) };
		let ptr = NonNull::new(ptr).ok_or_else(|| {
			Error::ResourceExhausted(format!("failed to allocate {} bytes", len))
		})?;
		log::debug!("allocated {} bytes at {:p}", len, ptr);
		Ok(Storage { ptr, len })
	}

	pub fn as_ptr(&self) -> *mut u8 {
		self.ptr.as_ptr()
	}

	pub fn len(&self) -> usize {
		self.len
	}
}

impl Drop for Storage {
	fn drop(&mut self) {
		if self.len == 0 {
			return;
		}
		log::debug!("releasing {} bytes at {:p}", self.len, self.ptr);
		unsafe {
			let layout = Layout::from_size_align_unchecked(self.len, ALIGNMENT);
			dealloc(self.ptr.as_ptr(), layout);
		}
	}
}

#[test]
fn test_zeroed() {
	let storage = Storage::zeroed(100).unwrap();
	assert_eq!(storage.len(), 100);
	assert_eq!(storage.as_ptr() as usize % ALIGNMENT, 0);
	let bytes = unsafe { std::slice::from_raw_parts(storage.as_ptr(), storage.len()) };
	assert!(bytes.iter().all(|byte| *byte == 0));
}

#[test]
fn test_empty() {
	let storage = Storage::zeroed(0).unwrap();
	assert_eq!(storage.len(), 0);
	assert_eq!(storage.as_ptr() as usize % ALIGNMENT, 0);
}

#[test]
fn test_too_large() {
	let result = Storage::zeroed(usize::MAX - 8);
	assert!(matches!(result, Err(Error::ResourceExhausted(_))));
}
