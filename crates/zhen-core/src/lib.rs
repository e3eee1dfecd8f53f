//! # zhen-core
//!
//! zhen 帧级解码框架核心库, 提供像素格式、时间基、色彩描述与统一错误类型.
//!
//! 上层的帧线程调度器与 DPB 管理器都只依赖本 crate 中的基础类型.

pub mod color;
pub mod error;
pub mod pixel_format;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{ZhenError, ZhenResult};
pub use pixel_format::PixelFormat;
pub use rational::Rational;
pub use timestamp::Timestamp;
