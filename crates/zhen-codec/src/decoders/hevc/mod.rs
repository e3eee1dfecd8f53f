//! H.265/HEVC 参考帧管理与参考解码器.
//!
//! 解码器按访问单元驱动 DPB:
//! - 解析合成访问单元 ([`AccessUnit`])
//! - IDR/BLA/序列结束后开始新的解码序列
//! - 分配当前图像, 推导帧级 RPS, 为每个 slice 构建 L0/L1
//! - IRAP 输出处理、bumping, 选出下一个显示顺序输出的图像
//! - setup 完成后按 CTB 行重建样本, 逐行等待参考帧进度
//!
//! # 限制
//! - 不进行 CABAC 熵解码与实际的帧内/帧间预测
//! - 重建结果是基准值与所有参考帧同位置采样的均值

mod dpb;
mod output;
mod params;
mod picture;
mod reconstruct;
mod ref_list;
mod rps;
mod stream;
mod unit;


use std::collections::VecDeque;

use log::debug;
use zhen_core::{ZhenError, ZhenResult};

use crate::codec_parameters::StreamParams;
use crate::decoder::Decoder;
use crate::frame::{PictureType, VideoFrame};
use crate::frame_thread::{FrameContext, FrameThreadCodec};
use crate::packet::Packet;

pub use dpb::{
    DPB_SIZE, Dpb, MAX_REFS, OutputPicture, RefKind, RpsType, SEQUENCE_COUNTER_INVALID,
    SEQUENCE_COUNTER_MASK,
};
pub use params::{
    LongTermRef, NalUnitType, SeqParams, ShortTermRef, ShortTermRps, SliceHeader, SliceType,
};
pub use picture::{HevcFrame, PicFlags, PicId, PictureBuffer, RefEntry, RefPicList};
pub use stream::{StreamConfig, synthesize};
pub use unit::AccessUnit;

/// 在帧线程之间传播的解码状态
#[derive(Debug, Clone)]
pub struct HevcState {
    dpb: Dpb,
    params: StreamParams,
    /// 随机访问点之后 RASL 图像的跳过界限
    max_ra: i32,
    /// 上一个单元之后是序列结束
    eos: bool,
}

impl Default for HevcState {
    fn default() -> Self {
        Self {
            dpb: Dpb::new(),
            params: StreamParams::default(),
            max_ra: i32::MAX,
            eos: false,
        }
    }
}

impl HevcState {
    pub fn dpb(&self) -> &Dpb {
        &self.dpb
    }
}

/// HEVC 解码器
#[derive(Default)]
pub struct HevcDecoder {
    state: HevcState,
    /// 单线程模式下等待取出的帧
    ready: VecDeque<VideoFrame>,
    draining: bool,
    frame_count: u64,
}

impl HevcDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建 HEVC 解码器实例
    pub fn create() -> ZhenResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new()))
    }

    pub fn dpb(&self) -> &Dpb {
        &self.state.dpb
    }

    /// 已完成 setup 的单元数
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// 解码一个访问单元, 空包表示流结束
    fn decode_unit(
        &mut self,
        ctx: &FrameContext<'_, HevcState, ()>,
        packet: &Packet,
    ) -> ZhenResult<Option<VideoFrame>> {
        if packet.is_empty() {
            let output = self.state.dpb.output_next(true);
            ctx.finish_setup(self.state.clone());
            return Ok(output.map(|picture| self.build_output_frame(&picture)));
        }

        let unit = AccessUnit::parse(&packet.data)?;
        self.activate(&unit)?;
        self.state.dpb.set_debug_progress(ctx.debug_threads());

        let nal_type = unit.nal_type;
        let last_eos = std::mem::take(&mut self.state.eos);
        if nal_type.is_idr() || nal_type.is_bla() {
            self.state.dpb.new_sequence();
            self.state.max_ra = i32::MAX;
            if nal_type.is_idr() {
                self.state.dpb.clear_refs();
            }
        }
        let cra_after_eos = nal_type == NalUnitType::Cra && last_eos;
        let no_rasl_output = nal_type.is_idr() || nal_type.is_bla() || cra_after_eos;
        let no_output_of_prior_pics = unit.no_output_of_prior_pics || cra_after_eos;

        if self.skip_rasl(nal_type, unit.poc) {
            debug!("跳过随机访问点之前的 RASL 图像 POC {}", unit.poc);
            if unit.eos {
                self.end_sequence();
            }
            return Ok(None);
        }

        ctx.check_get_buffer()?;
        let current = self.state.dpb.set_new_ref(unit.poc, unit.pic_output)?;
        if let Some(frame) = self.state.dpb.frame_mut(current) {
            frame.pts = packet.pts;
            frame.is_keyframe = nal_type.is_irap();
        }

        if let Err(e) = self.build_ref_lists(&unit) {
            debug!("HEVC: POC {} 参考列表构建失败: {}", unit.poc, e);
            self.state.dpb.drop_current();
            return Err(e);
        }

        if nal_type.is_irap() && no_rasl_output {
            self.state.dpb.prepare_irap_output(no_output_of_prior_pics);
        }
        self.state.dpb.bump();
        let output = self.state.dpb.output_next(false);
        if unit.eos {
            self.end_sequence();
        }
        self.update_params(&unit.sps);
        self.frame_count += 1;
        ctx.finish_setup(self.state.clone());

        reconstruct::reconstruct(&self.state.dpb, current, unit.fill)?;
        Ok(output.map(|picture| self.build_output_frame(&picture)))
    }

    /// 激活单元携带的序列参数, 非 IRAP 图像不能改变图像尺寸
    fn activate(&mut self, unit: &AccessUnit) -> ZhenResult<()> {
        if let Some(active) = self.state.dpb.sps() {
            if !active.same_geometry(&unit.sps) {
                if !unit.nal_type.is_irap() {
                    return Err(ZhenError::InvalidData(format!(
                        "HEVC: 非 IRAP 图像 (POC {}) 改变了图像参数",
                        unit.poc
                    )));
                }
                debug!(
                    "HEVC: 序列参数变化 {}x{} -> {}x{}",
                    active.width, active.height, unit.sps.width, unit.sps.height
                );
                self.state.dpb.clear_refs();
                self.state.dpb.new_sequence();
                self.state.max_ra = i32::MAX;
            }
        }
        self.state.dpb.activate(&unit.sps)
    }

    /// 随机访问点之前的 RASL 图像无法正确解码, 直接跳过
    fn skip_rasl(&mut self, nal_type: NalUnitType, poc: i32) -> bool {
        if self.state.max_ra == i32::MAX {
            if nal_type == NalUnitType::Cra || nal_type.is_bla() {
                self.state.max_ra = poc;
            } else if nal_type.is_idr() {
                self.state.max_ra = i32::MIN;
            }
        }
        if nal_type.is_rasl() && poc <= self.state.max_ra {
            return true;
        }
        if nal_type == NalUnitType::RaslR && poc > self.state.max_ra {
            self.state.max_ra = i32::MIN;
        }
        false
    }

    fn build_ref_lists(&mut self, unit: &AccessUnit) -> ZhenResult<()> {
        self.state
            .dpb
            .frame_rps(unit.short_term.as_ref(), &unit.long_term, unit.nal_type)?;
        for (slice_idx, slice) in unit.slices.iter().enumerate() {
            self.state.dpb.slice_rpl(slice, slice_idx, unit.curr_pic_ref)?;
        }
        Ok(())
    }

    fn end_sequence(&mut self) {
        self.state.dpb.new_sequence();
        self.state.max_ra = i32::MAX;
        self.state.eos = true;
    }

    fn update_params(&mut self, sps: &SeqParams) {
        let params = &mut self.state.params;
        params.width = u32::from(sps.width);
        params.height = u32::from(sps.height);
        params.pixel_format = sps.pixel_format().unwrap_or(params.pixel_format);
        params.reorder_depth = u32::from(sps.num_reorder_pics);
    }

    /// 调用方给出的时间基与色彩描述
    fn apply_open_params(&mut self, params: &StreamParams) {
        self.state.params.time_base = params.time_base;
        self.state.params.color_space = params.color_space;
        self.state.params.color_range = params.color_range;
    }

    /// 构建输出帧 (等待该图像重建完成)
    fn build_output_frame(&self, picture: &OutputPicture) -> VideoFrame {
        let mut frame = picture.buffer.to_video_frame();
        frame.pts = picture.pts;
        frame.poc = picture.poc;
        frame.is_keyframe = picture.is_keyframe;
        frame.picture_type = if picture.is_keyframe {
            PictureType::I
        } else {
            PictureType::P
        };
        frame.time_base = self.state.params.time_base;
        frame.color_space = self.state.params.color_space;
        frame.color_range = self.state.params.color_range;
        frame
    }
}

impl Decoder for HevcDecoder {
    fn name(&self) -> &str {
        "hevc"
    }

    fn open(&mut self, params: &StreamParams) -> ZhenResult<()> {
        self.apply_open_params(params);
        debug!("HEVC 解码器已打开");
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> ZhenResult<()> {
        if packet.is_empty() {
            self.draining = true;
            return Ok(());
        }
        if self.draining {
            return Err(ZhenError::InvalidArgument(
                "HEVC: 已进入排空模式, 需要先 flush".into(),
            ));
        }
        let ctx = FrameContext::unthreaded();
        if let Some(mut frame) = self.decode_unit(&ctx, packet)? {
            frame.pkt_dts = packet.dts;
            self.ready.push_back(frame);
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> ZhenResult<VideoFrame> {
        if let Some(frame) = self.ready.pop_front() {
            return Ok(frame);
        }
        if !self.draining {
            return Err(ZhenError::NeedMoreData);
        }
        match self.state.dpb.output_next(true) {
            Some(picture) => Ok(self.build_output_frame(&picture)),
            None => Err(ZhenError::Eof),
        }
    }

    fn flush(&mut self) {
        self.flush_codec();
        self.ready.clear();
        self.draining = false;
    }
}

impl FrameThreadCodec for HevcDecoder {
    type State = HevcState;
    type Token = ();

    fn codec_name(&self) -> &str {
        "hevc"
    }

    fn has_delay(&self) -> bool {
        true
    }

    fn snapshot(&self) -> HevcState {
        self.state.clone()
    }

    fn update_thread_context(&mut self, src: &HevcState) -> ZhenResult<()> {
        self.state.clone_from(src);
        Ok(())
    }

    fn decode(
        &mut self,
        ctx: &FrameContext<'_, HevcState, ()>,
        packet: &Packet,
    ) -> ZhenResult<Option<VideoFrame>> {
        self.decode_unit(ctx, packet)
    }

    fn open_codec(&mut self, params: &StreamParams) -> ZhenResult<()> {
        self.apply_open_params(params);
        Ok(())
    }

    fn stream_params(&self) -> StreamParams {
        self.state.params.clone()
    }

    fn flush_codec(&mut self) {
        self.state.dpb.flush_dpb();
        self.state.max_ra = i32::MAX;
        self.state.eos = true;
    }
}
