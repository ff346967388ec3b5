/*!
This crate provides literals, which are *n*-dimensional arrays of elements of the same type stored in host memory. Each literal has a [`Shape`](struct.Shape.html), which fixes its element type, the extent of each dimension, and the order in which the dimensions are laid out in memory.

Literals can be read and written through `ndarray` views that honor their layout, and they can be shared with other array libraries without copying through [DLPack](dlpack/index.html).

# Example

```
use literal::{ElementType, Literal, Shape};
use ndarray::prelude::*;

let input = Array::range(0.0f32, 100.0, 1.0).into_shape((25, 4)).unwrap();
let shape = Shape::array_shape(ElementType::F32, input.shape(), Some(&[0, 1])).unwrap();
let mut literal = Literal::new(shape).unwrap();
literal.view_mut::<f32>().unwrap().assign(&input);
let tensor = literal.to_dlpack().unwrap();
// Nothing writes to the literal while the view is alive.
let view = unsafe { tensor.view::<f32>() }.unwrap();
assert_eq!(view, input.into_dyn());
```
*/

pub mod config;
pub mod dlpack;
mod element_type;
mod error;
mod literal;
mod shape;
mod storage;

pub use self::dlpack::DlpackTensor;
pub use self::element_type::*;
pub use self::error::*;
pub use self::literal::*;
pub use self::shape::*;
pub use self::storage::ALIGNMENT;
