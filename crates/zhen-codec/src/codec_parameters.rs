//! 流参数.
//!
//! 解码器在解码过程中得到的、需要回传给调用方的参数. 帧线程模式下,
//! 每次取出结果后都从对应工作线程刷新一次.

use zhen_core::{
    PixelFormat, Rational,
    color::{ColorRange, ColorSpace},
};

/// 流参数
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 色彩空间
    pub color_space: ColorSpace,
    /// 色彩范围
    pub color_range: ColorRange,
    /// profile
    pub profile: u8,
    /// level
    pub level: u8,
    /// 显示重排深度 (最多有多少帧先解码后显示)
    pub reorder_depth: u32,
    /// 时间基
    pub time_base: Rational,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pixel_format: PixelFormat::None,
            color_space: ColorSpace::default(),
            color_range: ColorRange::default(),
            profile: 0,
            level: 0,
            reorder_depth: 0,
            time_base: Rational::UNDEFINED,
        }
    }
}

impl StreamParams {
    /// 是否已经得到有效的图像尺寸与像素格式
    pub fn is_configured(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixel_format != PixelFormat::None
    }
}
