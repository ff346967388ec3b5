/*!
This module defines `ShapeConfig`, the form in which shapes are written in JSON and YAML files.

```yaml
element_type: f32
dimensions: [25, 4]
minor_to_major: [0, 1]
```
*/

use crate::{ElementType, Error, Result, Shape};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeConfig {
	pub element_type: ElementType,
	pub dimensions: Vec<usize>,
	#[serde(default)]
	pub minor_to_major: Option<Vec<usize>>,
}

impl ShapeConfig {
	pub fn into_shape(self) -> Result<Shape> {
		Shape::array_shape(
			self.element_type,
			&self.dimensions,
			self.minor_to_major.as_deref(),
		)
	}
}

pub fn shape_from_json(json: &str) -> Result<Shape> {
	let config: ShapeConfig =
		serde_json::from_str(json).map_err(|error| Error::Config(error.to_string()))?;
	config.into_shape()
}

pub fn shape_from_yaml(yaml: &str) -> Result<Shape> {
	let config: ShapeConfig =
		serde_yaml::from_str(yaml).map_err(|error| Error::Config(error.to_string()))?;
	config.into_shape()
}

/// Load a shape from a config file. Files ending in `.json` are parsed as JSON and all others as YAML.
pub fn load_shape_config(path: &Path) -> Result<Shape> {
	let config = std::fs::read_to_string(path).map_err(|error| {
		Error::Config(format!(
			"failed to read config file {}: {}",
			path.display(),
			error
		))
	})?;
	let is_json = path
		.extension()
		.map(|extension| extension == "json")
		.unwrap_or(false);
	if is_json {
		shape_from_json(&config)
	} else {
		shape_from_yaml(&config)
	}
}

#[test]
fn test_json() {
	let shape =
		shape_from_json(r#"{ "element_type": "f32", "dimensions": [20, 5], "minor_to_major": [1, 0] }"#)
			.unwrap();
	assert_eq!(shape.to_string(), "f32[20,5]{1,0}");
	let shape = shape_from_json(r#"{ "element_type": "s64", "dimensions": [2, 3] }"#).unwrap();
	assert_eq!(shape.minor_to_major(), &[1, 0]);
}

#[test]
fn test_yaml() {
	let shape = shape_from_yaml("element_type: bf16\ndimensions: [25, 4]\nminor_to_major: [0, 1]\n")
		.unwrap();
	assert_eq!(shape.to_string(), "bf16[25,4]{0,1}");
}

#[test]
fn test_invalid() {
	let result = shape_from_json(r#"{ "element_type": "float", "dimensions": [2] }"#);
	assert!(matches!(result, Err(Error::Config(_))));
	let result = shape_from_json(r#"{ "element_type": "f32", "dimensions": [2, 2], "minor_to_major": [1, 1] }"#);
	assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_shape_serde() {
	let shape = Shape::array_shape(ElementType::U8, &[3, 2], Some(&[0, 1])).unwrap();
	let json = serde_json::to_string(&shape).unwrap();
	assert_eq!(
		json,
		r#"{"element_type":"u8","dimensions":[3,2],"minor_to_major":[0,1]}"#
	);
	let parsed: Shape = serde_json::from_str(&json).unwrap();
	assert_eq!(parsed, shape);
	let invalid: Result<Shape, _> =
		serde_json::from_str(r#"{"element_type":"u8","dimensions":[3,2],"minor_to_major":[0]}"#);
	assert!(invalid.is_err());
}
