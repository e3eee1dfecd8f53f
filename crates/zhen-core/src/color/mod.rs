//! 色彩描述, 作为流级参数在解码线程间传播.

mod color_range;
mod color_space;

pub use color_range::ColorRange;
pub use color_space::ColorSpace;
