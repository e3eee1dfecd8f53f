//! DPB 中的图像: 标志位、共享样本缓冲区与参考列表.

use std::sync::{Arc, PoisonError, RwLock};

use bitflags::bitflags;
use zhen_core::{PixelFormat, ZhenError, ZhenResult};

use crate::frame::VideoFrame;
use crate::frame_thread::{PROGRESS_DONE, ThreadProgress};

bitflags! {
    /// 图像标志位, 全部清零时释放图像
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PicFlags: u8 {
        /// 等待输出
        const OUTPUT = 1 << 0;
        /// 短期参考
        const SHORT_REF = 1 << 1;
        /// 长期参考
        const LONG_REF = 1 << 2;
        /// 因 DPB 容量被标记为尽快输出
        const BUMPING = 1 << 3;
    }
}

/// DPB 槽位下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PicId(pub usize);

/// 参考列表中的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefEntry {
    pub poc: i32,
    pub pic: PicId,
    pub is_long_term: bool,
}

/// 参考图像列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefPicList {
    entries: Vec<RefEntry>,
}

impl RefPicList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RefEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RefEntry> {
        self.entries.iter()
    }

    /// 按列表顺序的 POC
    pub fn pocs(&self) -> Vec<i32> {
        self.entries.iter().map(|entry| entry.poc).collect()
    }

    pub(super) fn push(&mut self, entry: RefEntry) {
        self.entries.push(entry);
    }

    pub(super) fn set(&mut self, index: usize, entry: RefEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = entry;
        }
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 图像样本缓冲区
///
/// 多个工作线程的 DPB 共享同一块缓冲区 (`Arc`). 写入方按 CTB 行上报进度,
/// 读取方先等待进度再读取对应的行.
#[derive(Debug)]
pub struct PictureBuffer {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    linesize: Vec<usize>,
    plane_heights: Vec<usize>,
    planes: Vec<RwLock<Vec<u8>>>,
    progress: ThreadProgress,
}

impl PictureBuffer {
    /// 分配缓冲区, 样本初始为 0
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat, debug: bool) -> ZhenResult<Self> {
        Self::with_progress(width, height, pixel_format, ThreadProgress::new(debug))
    }

    /// 分配已完成的缓冲区 (用于合成占位帧)
    pub fn completed(width: u32, height: u32, pixel_format: PixelFormat) -> ZhenResult<Self> {
        Self::with_progress(width, height, pixel_format, ThreadProgress::completed())
    }

    fn with_progress(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        progress: ThreadProgress,
    ) -> ZhenResult<Self> {
        let plane_count = pixel_format.plane_count() as usize;
        if plane_count == 0 || width == 0 || height == 0 {
            return Err(ZhenError::InvalidArgument(format!(
                "无法分配 {}x{} {} 图像缓冲区",
                width, height, pixel_format
            )));
        }
        let mut linesize = Vec::with_capacity(plane_count);
        let mut plane_heights = Vec::with_capacity(plane_count);
        let mut planes = Vec::with_capacity(plane_count);
        for plane in 0..plane_count {
            let stride = pixel_format.plane_linesize(plane, width).unwrap_or(0);
            let rows = pixel_format.plane_height(plane, height).unwrap_or(0);
            linesize.push(stride);
            plane_heights.push(rows);
            planes.push(RwLock::new(vec![0u8; stride * rows]));
        }
        Ok(Self {
            width,
            height,
            pixel_format,
            linesize,
            plane_heights,
            planes,
            progress,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// 平面的 (采样宽度, 行数)
    pub fn plane_dims(&self, plane: usize) -> (usize, usize) {
        (
            self.linesize[plane] / self.pixel_format.bytes_per_sample(),
            self.plane_heights[plane],
        )
    }

    pub fn progress(&self) -> &ThreadProgress {
        &self.progress
    }

    /// 所有平面填充同一个采样值
    pub fn fill(&self, value: u16) {
        let bps = self.pixel_format.bytes_per_sample();
        for plane in &self.planes {
            let mut data = plane.write().unwrap_or_else(PoisonError::into_inner);
            if bps == 1 {
                data.fill(value as u8);
            } else {
                for chunk in data.chunks_exact_mut(2) {
                    chunk.copy_from_slice(&value.to_le_bytes());
                }
            }
        }
    }

    /// 读取一个采样值
    pub fn sample(&self, plane: usize, x: usize, y: usize) -> u16 {
        let data = self.planes[plane].read().unwrap_or_else(PoisonError::into_inner);
        read_sample(&data, y * self.linesize[plane], x, self.pixel_format.bytes_per_sample())
    }

    /// 读取 `[y0, y1)` 行, 按行主序返回采样值
    pub fn read_rows(&self, plane: usize, y0: usize, y1: usize) -> Vec<u16> {
        let bps = self.pixel_format.bytes_per_sample();
        let stride = self.linesize[plane];
        let width = stride / bps;
        let data = self.planes[plane].read().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::with_capacity(width * (y1 - y0));
        for y in y0..y1 {
            for x in 0..width {
                out.push(read_sample(&data, y * stride, x, bps));
            }
        }
        out
    }

    /// 写入 `[y0, y1)` 行, `samples` 按行主序
    pub fn write_rows(&self, plane: usize, y0: usize, samples: &[u16]) {
        let bps = self.pixel_format.bytes_per_sample();
        let stride = self.linesize[plane];
        let width = stride / bps;
        let mut data = self.planes[plane].write().unwrap_or_else(PoisonError::into_inner);
        for (i, &value) in samples.iter().enumerate() {
            let offset = (y0 + i / width) * stride + (i % width) * bps;
            if bps == 1 {
                data[offset] = value as u8;
            } else {
                data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    /// 等待解码完成后复制为输出帧
    pub fn to_video_frame(&self) -> VideoFrame {
        self.progress.wait(PROGRESS_DONE, 0);
        let mut frame = VideoFrame::new(self.width, self.height, self.pixel_format);
        for (plane, lock) in self.planes.iter().enumerate() {
            frame.data[plane] = lock.read().unwrap_or_else(PoisonError::into_inner).clone();
            frame.linesize[plane] = self.linesize[plane];
        }
        frame
    }
}

fn read_sample(data: &[u8], row_offset: usize, x: usize, bps: usize) -> u16 {
    let offset = row_offset + x * bps;
    if bps == 1 {
        u16::from(data[offset])
    } else {
        u16::from_le_bytes([data[offset], data[offset + 1]])
    }
}

/// DPB 中的一个图像槽位
#[derive(Debug, Clone, Default)]
pub struct HevcFrame {
    pub(super) buffer: Option<Arc<PictureBuffer>>,
    pub poc: i32,
    pub flags: PicFlags,
    /// 所属解码序列
    pub sequence: u16,
    pub pts: i64,
    pub is_keyframe: bool,
    /// 每个 slice 一组 L0/L1
    pub(super) rpl: Vec<[RefPicList; 2]>,
    /// CTB (tile 扫描地址) 所属的 slice 序号
    pub(super) rpl_tab: Vec<u16>,
    pub(super) collocated: Option<PicId>,
}

impl HevcFrame {
    /// 槽位是否被占用
    pub fn is_live(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<&Arc<PictureBuffer>> {
        self.buffer.as_ref()
    }

    /// 第 `slice_idx` 个 slice 的参考列表
    pub fn ref_lists(&self, slice_idx: usize) -> Option<&[RefPicList; 2]> {
        self.rpl.get(slice_idx)
    }

    /// 本图像的 collocated 参考帧
    pub fn collocated(&self) -> Option<PicId> {
        self.collocated
    }

    pub(super) fn release(&mut self) {
        self.buffer = None;
        self.flags = PicFlags::empty();
        self.rpl.clear();
        self.rpl_tab.clear();
        self.collocated = None;
    }
}
