//! 解码后的视频帧 (Frame).
//!
//! 平面存储的原始像素数据, 高位深格式每个采样 2 字节小端.

use zhen_core::timestamp::NOPTS_VALUE;
use zhen_core::{
    PixelFormat, Rational,
    color::{ColorRange, ColorSpace},
};

/// 视频帧
///
/// 包含解码后的原始像素数据, 支持多平面存储.
/// 例如 YUV420P 格式有 3 个平面: Y, U, V.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 各平面的像素数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数 (linesize / stride)
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 产生本帧输出的数据包的 DTS
    pub pkt_dts: i64,
    /// 时间基
    pub time_base: Rational,
    /// 图像顺序号 (POC)
    pub poc: i32,
    /// 是否为关键帧
    pub is_keyframe: bool,
    /// 图片类型 (I/P/B 帧)
    pub picture_type: PictureType,
    /// 色彩空间
    pub color_space: ColorSpace,
    /// 色彩范围
    pub color_range: ColorRange,
}

impl VideoFrame {
    /// 创建空的视频帧
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let plane_count = pixel_format.plane_count() as usize;
        Self {
            data: vec![Vec::new(); plane_count],
            linesize: vec![0; plane_count],
            width,
            height,
            pixel_format,
            pts: NOPTS_VALUE,
            pkt_dts: NOPTS_VALUE,
            time_base: Rational::UNDEFINED,
            poc: 0,
            is_keyframe: false,
            picture_type: PictureType::None,
            color_space: ColorSpace::default(),
            color_range: ColorRange::default(),
        }
    }

    /// 读取一个采样值 (按像素格式位深解释)
    ///
    /// 坐标越界时返回 `None`.
    pub fn sample(&self, plane: usize, x: usize, y: usize) -> Option<u16> {
        let bps = self.pixel_format.bytes_per_sample();
        let offset = y.checked_mul(*self.linesize.get(plane)?)? + x * bps;
        let data = self.data.get(plane)?;
        if bps == 2 {
            let bytes = data.get(offset..offset + 2)?;
            Some(u16::from_le_bytes([bytes[0], bytes[1]]))
        } else {
            data.get(offset).map(|&v| u16::from(v))
        }
    }

    /// 所有平面数据的简单校验和 (按字节累加)
    pub fn checksum(&self) -> u64 {
        self.data
            .iter()
            .flat_map(|plane| plane.iter())
            .fold(0u64, |acc, &b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
    }
}

/// 图片类型 (I/P/B 帧)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PictureType {
    /// 未指定
    #[default]
    None,
    /// I 帧 (关键帧, 帧内编码)
    I,
    /// P 帧 (前向预测)
    P,
    /// B 帧 (双向预测)
    B,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_8bit_and_10bit() {
        let mut frame = VideoFrame::new(2, 2, PixelFormat::Gray8);
        frame.linesize[0] = 2;
        frame.data[0] = vec![1, 2, 3, 4];
        assert_eq!(frame.sample(0, 1, 1), Some(4));
        assert_eq!(frame.sample(0, 2, 1), None, "越界坐标应返回 None");

        let mut frame = VideoFrame::new(1, 1, PixelFormat::Gray10le);
        frame.linesize[0] = 2;
        frame.data[0] = 512u16.to_le_bytes().to_vec();
        assert_eq!(frame.sample(0, 0, 0), Some(512));
    }

    #[test]
    fn test_checksum_depends_on_content() {
        let mut a = VideoFrame::new(1, 1, PixelFormat::Gray8);
        a.data[0] = vec![1, 2];
        let mut b = a.clone();
        b.data[0] = vec![2, 1];
        assert_ne!(a.checksum(), b.checksum(), "校验和应区分字节顺序");
    }
}
