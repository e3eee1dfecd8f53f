//! 像素格式定义.
//!
//! 解码输出与占位参考帧使用的平面像素格式. 高位深格式每个采样占 2 字节 (小端).

use std::fmt;

/// 像素格式
///
/// 命名规则: 颜色空间 + 色度采样 + 位深 (P=Planar, LE=小端).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 未指定
    None,
    /// 灰度 8 位 (chroma_format_idc = 0)
    Gray8,
    /// YUV 4:2:0 平面格式, 8 位
    Yuv420p,
    /// YUV 4:2:2 平面格式, 8 位
    Yuv422p,
    /// YUV 4:4:4 平面格式, 8 位
    Yuv444p,
    /// 灰度 10 位小端
    Gray10le,
    /// YUV 4:2:0 平面格式, 10 位小端
    Yuv420p10le,
    /// YUV 4:2:2 平面格式, 10 位小端
    Yuv422p10le,
    /// YUV 4:4:4 平面格式, 10 位小端
    Yuv444p10le,
}

impl PixelFormat {
    /// 根据 chroma_format_idc 与位深选择像素格式
    ///
    /// 不支持的组合返回 `None`.
    pub const fn from_chroma_format(chroma_format_idc: u8, bit_depth: u8) -> Option<Self> {
        Some(match (chroma_format_idc, bit_depth) {
            (0, 8) => Self::Gray8,
            (1, 8) => Self::Yuv420p,
            (2, 8) => Self::Yuv422p,
            (3, 8) => Self::Yuv444p,
            (0, 10) => Self::Gray10le,
            (1, 10) => Self::Yuv420p10le,
            (2, 10) => Self::Yuv422p10le,
            (3, 10) => Self::Yuv444p10le,
            _ => return None,
        })
    }

    /// 单个分量的位深
    pub const fn bit_depth(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Gray8 | Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 8,
            Self::Gray10le | Self::Yuv420p10le | Self::Yuv422p10le | Self::Yuv444p10le => 10,
        }
    }

    /// 每个采样占用的字节数
    pub const fn bytes_per_sample(&self) -> usize {
        if self.bit_depth() > 8 { 2 } else { 1 }
    }

    /// 中间电平采样值 `1 << (bit_depth - 1)`, 用于填充缺失参考帧
    pub const fn mid_level(&self) -> u16 {
        match self.bit_depth() {
            0 => 0,
            depth => 1 << (depth - 1),
        }
    }

    /// 获取色度子采样 (log2 水平, log2 垂直)
    pub const fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p | Self::Yuv420p10le => (1, 1),
            Self::Yuv422p | Self::Yuv422p10le => (1, 0),
            _ => (0, 0),
        }
    }

    /// 平面数量
    pub const fn plane_count(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Gray8 | Self::Gray10le => 1,
            _ => 3,
        }
    }

    /// 计算指定平面每行的字节数 (linesize / stride)
    ///
    /// 格式为 None 或平面索引超出范围时返回 `None`.
    pub fn plane_linesize(&self, plane: usize, width: u32) -> Option<usize> {
        if plane >= self.plane_count() as usize {
            return None;
        }
        let (sub_h, _) = self.chroma_subsampling();
        let w = if plane == 0 {
            width as usize
        } else {
            (width as usize).div_ceil(1 << sub_h)
        };
        Some(w * self.bytes_per_sample())
    }

    /// 计算指定平面的行数
    pub fn plane_height(&self, plane: usize, height: u32) -> Option<usize> {
        if plane >= self.plane_count() as usize {
            return None;
        }
        let (_, sub_v) = self.chroma_subsampling();
        Some(if plane == 0 {
            height as usize
        } else {
            (height as usize).div_ceil(1 << sub_v)
        })
    }

    /// 计算整帧的字节数
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        if *self == Self::None {
            return None;
        }
        let mut total = 0usize;
        for plane in 0..self.plane_count() as usize {
            total += self.plane_linesize(plane, width)? * self.plane_height(plane, height)?;
        }
        Some(total)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Gray8 => "gray8",
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Gray10le => "gray10le",
            Self::Yuv420p10le => "yuv420p10le",
            Self::Yuv422p10le => "yuv422p10le",
            Self::Yuv444p10le => "yuv444p10le",
        };
        write!(f, "{name}")
    }
}
