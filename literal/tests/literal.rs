use literal::{config::load_shape_config, ElementType, Error, Literal, NativeType, Shape};
use ndarray::prelude::*;

fn init() {
	let _ = env_logger::builder().is_test(true).try_init();
}

fn range_f32(n: usize) -> Array1<f32> {
	Array::range(0.0f32, n as f32, 1.0)
}

/// Build a literal shaped like `input`, copy `input` in through a view, and read it back through a DLPack export.
fn round_trip<T>(input: ArrayViewD<T>, minor_to_major: Option<&[usize]>) -> ArrayD<T>
where
	T: NativeType,
{
	let shape = Shape::array_shape(T::ELEMENT_TYPE, input.shape(), minor_to_major).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	let mut view = literal.view_mut::<T>().unwrap();
	view.assign(&input);
	let tensor = literal.to_dlpack().unwrap();
	let view = unsafe { tensor.view::<T>() }.unwrap();
	view.to_owned()
}

#[test]
fn test_create_literal_rank_1() {
	init();
	let input = range_f32(10);
	let shape = Shape::array_shape(ElementType::F32, input.shape(), None).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	let mut view = literal.view_mut::<f32>().unwrap();
	view.assign(&input);
	// Read through the export rather than `view` so the check observes the literal's storage.
	let tensor = literal.to_dlpack().unwrap();
	assert_eq!(unsafe { tensor.view::<f32>() }.unwrap(), input.into_dyn());
}

#[test]
fn test_create_literal_rank_2() {
	init();
	let input = range_f32(100).into_shape((20, 5)).unwrap();
	let shape = Shape::array_shape(ElementType::F32, input.shape(), Some(&[1, 0])).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	literal.view_mut::<f32>().unwrap().assign(&input);
	let tensor = literal.to_dlpack().unwrap();
	assert_eq!(unsafe { tensor.view::<f32>() }.unwrap(), input.into_dyn());
}

#[test]
fn test_create_literal_rank_2_reverse_layout() {
	init();
	let input = range_f32(100).into_shape((25, 4)).unwrap();
	let shape = Shape::array_shape(ElementType::F32, input.shape(), Some(&[0, 1])).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	literal.view_mut::<f32>().unwrap().assign(&input);
	let tensor = literal.to_dlpack().unwrap();
	assert_eq!(unsafe { tensor.view::<f32>() }.unwrap(), input.view().into_dyn());
	// The storage is column major: the first 25 floats are the first column.
	let first_column: Vec<f32> = literal
		.as_bytes()
		.chunks(4)
		.take(25)
		.map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
		.collect();
	assert_eq!(first_column, input.column(0).to_vec());
}

#[test]
fn test_view_matches_shape() {
	init();
	let cases: Vec<(ElementType, Vec<usize>)> = vec![
		(ElementType::Pred, vec![]),
		(ElementType::S8, vec![3]),
		(ElementType::S32, vec![2, 3]),
		(ElementType::U16, vec![2, 0, 4]),
		(ElementType::F64, vec![1, 2, 3, 4]),
	];
	for (element_type, dimensions) in cases {
		let shape = Shape::array_shape(element_type, &dimensions, None).unwrap();
		let literal = Literal::new(shape).unwrap();
		let view_shape = match element_type {
			ElementType::Pred => literal.view::<bool>().unwrap().shape().to_owned(),
			ElementType::S8 => literal.view::<i8>().unwrap().shape().to_owned(),
			ElementType::S32 => literal.view::<i32>().unwrap().shape().to_owned(),
			ElementType::U16 => literal.view::<u16>().unwrap().shape().to_owned(),
			ElementType::F64 => literal.view::<f64>().unwrap().shape().to_owned(),
			_ => unreachable!(),
		};
		assert_eq!(view_shape, dimensions);
		assert_eq!(literal.element_type(), element_type);
		assert_eq!(literal.to_dlpack().unwrap().element_type(), element_type);
	}
}

#[test]
fn test_round_trip_all_layouts() {
	init();
	let input = Array::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as i32).into_dyn();
	let layouts: [[usize; 3]; 6] = [
		[0, 1, 2],
		[0, 2, 1],
		[1, 0, 2],
		[1, 2, 0],
		[2, 0, 1],
		[2, 1, 0],
	];
	for layout in layouts.iter() {
		assert_eq!(round_trip(input.view(), Some(&layout[..])), input);
	}
	assert_eq!(round_trip(input.view(), None), input);
}

#[test]
fn test_export_aliases_storage() {
	init();
	let shape = Shape::array_shape(ElementType::F32, &[4], None).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	let tensor = literal.to_dlpack().unwrap();
	assert_eq!(unsafe { tensor.view::<f32>() }.unwrap(), arr1(&[0.0f32; 4]).into_dyn());
	literal
		.view_mut::<f32>()
		.unwrap()
		.assign(&arr1(&[1.0f32, 2.0, 3.0, 4.0]));
	assert_eq!(
		unsafe { tensor.view::<f32>() }.unwrap(),
		arr1(&[1.0f32, 2.0, 3.0, 4.0]).into_dyn()
	);
	let second = literal.to_dlpack().unwrap();
	assert_eq!(
		second.as_dl_tensor().data,
		tensor.as_dl_tensor().data
	);
}

#[test]
fn test_writes_through_export_reach_literal() {
	init();
	let shape = Shape::array_shape(ElementType::S64, &[2, 2], Some(&[0, 1])).unwrap();
	let literal = Literal::new(shape).unwrap();
	let mut tensor = literal.to_dlpack().unwrap();
	unsafe { tensor.view_mut::<i64>() }
		.unwrap()
		.assign(&arr2(&[[1i64, 2], [3, 4]]));
	assert_eq!(
		literal.view::<i64>().unwrap(),
		arr2(&[[1i64, 2], [3, 4]]).into_dyn()
	);
}

#[test]
fn test_layout_changes_bytes_not_values() {
	init();
	let input = range_f32(12).into_shape((3, 4)).unwrap();
	let row_major = Literal::from_array(input.view(), Some(&[1, 0])).unwrap();
	let column_major = Literal::from_array(input.view(), Some(&[0, 1])).unwrap();
	assert_ne!(row_major.as_bytes(), column_major.as_bytes());
	assert_eq!(
		row_major.view::<f32>().unwrap(),
		column_major.view::<f32>().unwrap()
	);
	assert_eq!(row_major.relayout(&[0, 1]).unwrap(), column_major);
}

#[test]
fn test_copy_from_rejects_mismatch() {
	init();
	let shape = Shape::array_shape(ElementType::F32, &[2, 3], None).unwrap();
	let mut literal = Literal::new(shape).unwrap();
	let wrong_type = Array2::<f64>::zeros((2, 3));
	assert!(matches!(
		literal.copy_from(wrong_type.view()),
		Err(Error::InvalidArgument(_))
	));
	let wrong_shape = Array2::<f32>::ones((3, 2));
	assert!(matches!(
		literal.copy_from(wrong_shape.view()),
		Err(Error::InvalidArgument(_))
	));
	let right = Array2::<f32>::ones((2, 3));
	literal.copy_from(right.view()).unwrap();
	assert_eq!(literal.to_array::<f32>().unwrap(), right.into_dyn());
}

#[test]
fn test_file_round_trip() {
	init();
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("literal.bin");
	let input = Array::from_shape_fn((4, 5), |(i, j)| i as u8 * 5 + j as u8);
	let literal = Literal::from_array(input.view(), Some(&[0, 1])).unwrap();
	literal.to_file(&path).unwrap();
	let restored = Literal::from_path(&path).unwrap();
	assert_eq!(restored, literal);
	assert_eq!(restored.view::<u8>().unwrap(), input.into_dyn());
}

#[test]
fn test_pred_file_with_invalid_byte() {
	init();
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("pred.bin");
	let literal = Literal::from_array(arr1(&[true]).view(), None).unwrap();
	literal.to_file(&path).unwrap();
	let mut bytes = std::fs::read(&path).unwrap();
	*bytes.last_mut().unwrap() = 2;
	std::fs::write(&path, &bytes).unwrap();
	assert!(matches!(
		Literal::from_path(&path),
		Err(Error::InvalidArgument(_))
	));
}

#[test]
fn test_load_shape_config() {
	init();
	let dir = tempfile::tempdir().unwrap();
	let json_path = dir.path().join("shape.json");
	std::fs::write(
		&json_path,
		r#"{ "element_type": "f32", "dimensions": [25, 4], "minor_to_major": [0, 1] }"#,
	)
	.unwrap();
	let yaml_path = dir.path().join("shape.yaml");
	std::fs::write(&yaml_path, "element_type: f32\ndimensions: [25, 4]\nminor_to_major: [0, 1]\n")
		.unwrap();
	let from_json = load_shape_config(&json_path).unwrap();
	let from_yaml = load_shape_config(&yaml_path).unwrap();
	assert_eq!(from_json, from_yaml);
	assert_eq!(from_json, "f32[25,4]{0,1}".parse::<Shape>().unwrap());
	assert!(matches!(
		load_shape_config(&dir.path().join("missing.yaml")),
		Err(Error::Config(_))
	));
}
