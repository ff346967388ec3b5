use crate::{invalid_argument, Error};

/// The scalar type of each element of a shape. The names match XLA's primitive type names.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ElementType {
	Invalid,
	Pred,
	S8,
	S16,
	S32,
	S64,
	U8,
	U16,
	U32,
	U64,
	F16,
	BF16,
	F32,
	F64,
	C64,
	C128,
	Tuple,
	OpaqueType,
	Token,
}

impl ElementType {
	pub fn name(self) -> &'static str {
		match self {
			ElementType::Invalid => "invalid",
			ElementType::Pred => "pred",
			ElementType::S8 => "s8",
			ElementType::S16 => "s16",
			ElementType::S32 => "s32",
			ElementType::S64 => "s64",
			ElementType::U8 => "u8",
			ElementType::U16 => "u16",
			ElementType::U32 => "u32",
			ElementType::U64 => "u64",
			ElementType::F16 => "f16",
			ElementType::BF16 => "bf16",
			ElementType::F32 => "f32",
			ElementType::F64 => "f64",
			ElementType::C64 => "c64",
			ElementType::C128 => "c128",
			ElementType::Tuple => "tuple",
			ElementType::OpaqueType => "opaque",
			ElementType::Token => "token",
		}
	}

	/// The size in bytes of one element, or `None` if values of this type cannot be stored in an array.
	pub fn byte_size(self) -> Option<usize> {
		match self {
			ElementType::Pred | ElementType::S8 | ElementType::U8 => Some(1),
			ElementType::S16 | ElementType::U16 | ElementType::F16 | ElementType::BF16 => Some(2),
			ElementType::S32 | ElementType::U32 | ElementType::F32 => Some(4),
			ElementType::S64 | ElementType::U64 | ElementType::F64 | ElementType::C64 => Some(8),
			ElementType::C128 => Some(16),
			ElementType::Invalid
			| ElementType::Tuple
			| ElementType::OpaqueType
			| ElementType::Token => None,
		}
	}

	pub fn is_array(self) -> bool {
		self.byte_size().is_some()
	}
}

impl std::str::FromStr for ElementType {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let element_type = match s {
			"invalid" => ElementType::Invalid,
			"pred" => ElementType::Pred,
			"s8" => ElementType::S8,
			"s16" => ElementType::S16,
			"s32" => ElementType::S32,
			"s64" => ElementType::S64,
			"u8" => ElementType::U8,
			"u16" => ElementType::U16,
			"u32" => ElementType::U32,
			"u64" => ElementType::U64,
			"f16" => ElementType::F16,
			"bf16" => ElementType::BF16,
			"f32" => ElementType::F32,
			"f64" => ElementType::F64,
			"c64" => ElementType::C64,
			"c128" => ElementType::C128,
			"tuple" => ElementType::Tuple,
			"opaque" => ElementType::OpaqueType,
			"token" => ElementType::Token,
			_ => return Err(invalid_argument!("unknown element type \"{}\"", s)),
		};
		Ok(element_type)
	}
}

impl std::fmt::Display for ElementType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

impl serde::Serialize for ElementType {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(self.name())
	}
}

struct ElementTypeVisitor;

impl<'de> serde::de::Visitor<'de> for ElementTypeVisitor {
	type Value = ElementType;
	fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
		formatter.write_str("an element type name such as \"f32\"")
	}
	fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
	where
		E: serde::de::Error,
	{
		value.parse().map_err(E::custom)
	}
}

impl<'de> serde::Deserialize<'de> for ElementType {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		deserializer.deserialize_str(ElementTypeVisitor)
	}
}

/// A rust type that can be viewed as the elements of an array of the matching `ElementType`.
pub trait NativeType: Copy + std::fmt::Debug + 'static {
	const ELEMENT_TYPE: ElementType;
}

macro_rules! native_type {
	($ty:ty, $element_type:ident) => {
		impl NativeType for $ty {
			const ELEMENT_TYPE: ElementType = ElementType::$element_type;
		}
	};
}

native_type!(bool, Pred);
native_type!(i8, S8);
native_type!(i16, S16);
native_type!(i32, S32);
native_type!(i64, S64);
native_type!(u8, U8);
native_type!(u16, U16);
native_type!(u32, U32);
native_type!(u64, U64);
native_type!(f32, F32);
native_type!(f64, F64);

#[test]
fn test_parse() {
	for name in &["pred", "s8", "u64", "f16", "bf16", "f32", "c128", "token"] {
		let element_type: ElementType = name.parse().unwrap();
		assert_eq!(element_type.to_string(), *name);
	}
	assert!("float32".parse::<ElementType>().is_err());
}

#[test]
fn test_byte_size() {
	assert_eq!(ElementType::Pred.byte_size(), Some(1));
	assert_eq!(ElementType::BF16.byte_size(), Some(2));
	assert_eq!(ElementType::F32.byte_size(), Some(4));
	assert_eq!(ElementType::C64.byte_size(), Some(8));
	assert_eq!(ElementType::C128.byte_size(), Some(16));
	assert_eq!(ElementType::Tuple.byte_size(), None);
	assert!(!ElementType::Token.is_array());
	assert_eq!(
		std::mem::size_of::<f64>(),
		<f64 as NativeType>::ELEMENT_TYPE.byte_size().unwrap()
	);
}
