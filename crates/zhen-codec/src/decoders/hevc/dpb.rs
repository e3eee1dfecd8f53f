//! 解码图像缓冲区 (DPB).
//!
//! 固定 32 个槽位. 每个槽位的图像带一组标志位 (参考/输出/bumping),
//! 标志位全部清零时释放样本缓冲区. DPB 元数据本身不是线程安全的: 帧线程模式下
//! 每个工作线程持有一份副本, 副本之间只共享样本缓冲区.

use std::sync::Arc;

use log::{debug, error};
use zhen_core::{ZhenError, ZhenResult};

use super::params::SeqParams;
use super::picture::{HevcFrame, PicFlags, PicId, PictureBuffer, RefPicList};
use crate::frame_thread::PROGRESS_DONE;

/// DPB 容量
pub const DPB_SIZE: usize = 32;
/// 单个参考列表的最大长度
pub const MAX_REFS: usize = 16;
/// 解码序列计数器掩码 (8 位回绕)
pub const SEQUENCE_COUNTER_MASK: u16 = 0xff;
/// 占位帧使用的序列号, 递增计数器永远不会产生该值
pub const SEQUENCE_COUNTER_INVALID: u16 = SEQUENCE_COUNTER_MASK + 1;

/// 帧级参考图像集的五个子集
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpsType {
    StCurrBef = 0,
    StCurrAft = 1,
    StFoll = 2,
    LtCurr = 3,
    LtFoll = 4,
}

pub(super) const NB_RPS_TYPE: usize = 5;

/// 参考标记类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Short,
    Long,
    Unused,
}

impl RefKind {
    pub(super) fn flag(self) -> PicFlags {
        match self {
            Self::Short => PicFlags::SHORT_REF,
            Self::Long => PicFlags::LONG_REF,
            Self::Unused => PicFlags::empty(),
        }
    }
}

/// 按显示顺序输出的图像
#[derive(Debug, Clone)]
pub struct OutputPicture {
    pub poc: i32,
    pub pts: i64,
    pub is_keyframe: bool,
    pub buffer: Arc<PictureBuffer>,
}

/// 解码图像缓冲区
#[derive(Debug, Clone)]
pub struct Dpb {
    pub(super) frames: Vec<HevcFrame>,
    pub(super) rps: [RefPicList; NB_RPS_TYPE],
    pub(super) seq_decode: u16,
    pub(super) seq_output: u16,
    /// 正在解码的图像
    pub(super) current: Option<PicId>,
    /// 当前图像的 POC
    pub(super) poc: i32,
    pub(super) sps: Option<SeqParams>,
    debug_progress: bool,
}

impl Default for Dpb {
    fn default() -> Self {
        Self::new()
    }
}

impl Dpb {
    pub fn new() -> Self {
        Self {
            frames: vec![HevcFrame::default(); DPB_SIZE],
            rps: Default::default(),
            seq_decode: 0,
            seq_output: 0,
            current: None,
            poc: 0,
            sps: None,
            debug_progress: false,
        }
    }

    /// 激活序列参数, 之后分配的图像使用新的尺寸与格式
    pub fn activate(&mut self, sps: &SeqParams) -> ZhenResult<()> {
        sps.validate()?;
        self.sps = Some(sps.clone());
        Ok(())
    }

    pub fn sps(&self) -> Option<&SeqParams> {
        self.sps.as_ref()
    }

    /// 新分配的图像是否输出进度调试日志
    pub fn set_debug_progress(&mut self, debug: bool) {
        self.debug_progress = debug;
    }

    pub fn seq_decode(&self) -> u16 {
        self.seq_decode
    }

    pub fn seq_output(&self) -> u16 {
        self.seq_output
    }

    /// 开始新的解码序列 (IDR/BLA 或序列结束之后)
    pub fn new_sequence(&mut self) {
        self.seq_decode = (self.seq_decode + 1) & SEQUENCE_COUNTER_MASK;
    }

    pub fn current(&self) -> Option<PicId> {
        self.current
    }

    pub fn current_poc(&self) -> i32 {
        self.poc
    }

    pub fn frame(&self, id: PicId) -> Option<&HevcFrame> {
        self.frames.get(id.0).filter(|frame| frame.is_live())
    }

    pub(crate) fn frame_mut(&mut self, id: PicId) -> Option<&mut HevcFrame> {
        self.frames.get_mut(id.0).filter(|frame| frame.is_live())
    }

    /// 占用中的槽位
    pub fn live_frames(&self) -> impl Iterator<Item = (PicId, &HevcFrame)> {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.is_live())
            .map(|(index, frame)| (PicId(index), frame))
    }

    pub fn live_count(&self) -> usize {
        self.frames.iter().filter(|frame| frame.is_live()).count()
    }

    /// 当前解码序列中 POC 为 `poc` 的图像
    pub fn find(&self, poc: i32) -> Option<PicId> {
        self.live_frames()
            .find(|(_, frame)| frame.sequence == self.seq_decode && frame.poc == poc)
            .map(|(id, _)| id)
    }

    /// 帧级参考图像集的一个子集
    pub fn rps(&self, kind: RpsType) -> &RefPicList {
        &self.rps[kind as usize]
    }

    /// 占用一个空闲槽位并分配样本缓冲区
    ///
    /// `placeholder` 为真时缓冲区填充中间电平并标记为已完成.
    pub(super) fn alloc_frame(&mut self, placeholder: bool) -> ZhenResult<PicId> {
        let sps = self
            .sps
            .as_ref()
            .ok_or_else(|| ZhenError::Internal("DPB 未激活序列参数".into()))?;
        let pixel_format = sps.pixel_format().ok_or_else(|| {
            ZhenError::Unsupported(format!(
                "HEVC: chroma_format_idc={}, bit_depth={}",
                sps.chroma_format_idc, sps.bit_depth
            ))
        })?;
        let Some(index) = self.frames.iter().position(|frame| !frame.is_live()) else {
            error!("分配帧失败, DPB 已满");
            return Err(ZhenError::DpbFull);
        };

        let (width, height) = (u32::from(sps.width), u32::from(sps.height));
        let buffer = if placeholder {
            let buffer = PictureBuffer::completed(width, height, pixel_format)?;
            buffer.fill(pixel_format.mid_level());
            buffer
        } else {
            PictureBuffer::new(width, height, pixel_format, self.debug_progress)?
        };
        let ctb_count = sps.ctb_count();

        let frame = &mut self.frames[index];
        frame.buffer = Some(Arc::new(buffer));
        frame.flags = PicFlags::empty();
        frame.rpl.clear();
        frame.rpl_tab = vec![0; ctb_count];
        frame.collocated = None;
        frame.pts = zhen_core::timestamp::NOPTS_VALUE;
        frame.is_keyframe = false;
        Ok(PicId(index))
    }

    /// 为当前解码序列分配一个 POC 为 `poc` 的图像, 标志位为空
    pub fn allocate(&mut self, poc: i32) -> ZhenResult<PicId> {
        if self.find(poc).is_some() {
            error!("序列内 POC 重复: {}", poc);
            return Err(ZhenError::DuplicatePoc(poc));
        }
        let id = self.alloc_frame(false)?;
        let frame = &mut self.frames[id.0];
        frame.poc = poc;
        frame.sequence = self.seq_decode;
        Ok(id)
    }

    /// 分配当前图像: 短期参考, `pic_output` 时同时等待输出
    pub fn set_new_ref(&mut self, poc: i32, pic_output: bool) -> ZhenResult<PicId> {
        let id = self.allocate(poc)?;
        self.frames[id.0].flags = if pic_output {
            PicFlags::OUTPUT | PicFlags::SHORT_REF
        } else {
            PicFlags::SHORT_REF
        };
        self.current = Some(id);
        self.poc = poc;
        Ok(id)
    }

    /// 当前图像解码失败: 唤醒等待它的线程并释放
    pub fn drop_current(&mut self) {
        if let Some(id) = self.current.take() {
            if let Some(buffer) = self.frames[id.0].buffer() {
                buffer.progress().report(PROGRESS_DONE, 0);
            }
            self.unref(id, PicFlags::all());
        }
    }

    /// 清除标志位, 全部清零时释放图像
    pub fn unref(&mut self, id: PicId, mask: PicFlags) {
        let Some(frame) = self.frames.get_mut(id.0) else {
            return;
        };
        if !frame.is_live() {
            return;
        }
        frame.flags.remove(mask);
        if frame.flags.is_empty() {
            frame.release();
        }
    }

    /// 标记当前解码序列中 POC 为 `poc` 的图像, 不存在时忽略
    pub fn set_reference(&mut self, poc: i32, kind: RefKind) {
        let Some(id) = self.find(poc) else {
            debug!("标记参考帧: POC {} 不在 DPB 中", poc);
            return;
        };
        mark_ref(&mut self.frames[id.0], kind.flag());
        self.unref(id, PicFlags::empty());
    }

    /// 清除所有图像的参考标记
    pub fn clear_refs(&mut self) {
        for index in 0..DPB_SIZE {
            self.unref(PicId(index), PicFlags::SHORT_REF | PicFlags::LONG_REF);
        }
    }

    /// 释放所有图像
    pub fn flush_dpb(&mut self) {
        for index in 0..DPB_SIZE {
            self.unref(PicId(index), PicFlags::all());
        }
        self.current = None;
        for list in &mut self.rps {
            list.clear();
        }
    }
}

/// 替换参考标记, 保留其他标志位
pub(super) fn mark_ref(frame: &mut HevcFrame, flag: PicFlags) {
    frame.flags.remove(PicFlags::SHORT_REF | PicFlags::LONG_REF);
    frame.flags.insert(flag);
}
