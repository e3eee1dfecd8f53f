//! 合成测试码流.
//!
//! 每个 GOP 以 IDR 开始 (POC 从 0 重新计数), 之后每隔 `b_frames + 1` 个 POC
//! 放一个 P 锚点帧, 锚点之间是双向参考的 B 帧. 解码顺序为锚点在前、
//! 中间的 B 帧在后. GOP 末尾凑不满一组的 POC 编为前向参考的 P 帧.

use serde::{Deserialize, Serialize};
use zhen_core::{ZhenError, ZhenResult};

use super::params::{NalUnitType, SeqParams, ShortTermRps, SliceHeader};
use super::unit::AccessUnit;
use crate::packet::Packet;

/// 合成码流参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub width: u16,
    pub height: u16,
    pub bit_depth: u8,
    pub chroma_format: u8,
    pub log2_ctb_size: u8,
    /// 每个 GOP 的图像数 (含 IDR)
    pub gop_size: u32,
    pub gop_count: u32,
    /// 相邻锚点帧之间的 B 帧数
    pub b_frames: u8,
    pub slices_per_picture: u8,
    /// 每隔多少个 P 锚点丢弃一个 (0 表示不丢弃), 用于产生缺失参考帧
    pub drop_every: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            bit_depth: 8,
            chroma_format: 1,
            log2_ctb_size: 4,
            gop_size: 12,
            gop_count: 2,
            b_frames: 2,
            slices_per_picture: 1,
            drop_every: 0,
        }
    }
}

impl StreamConfig {
    /// 对应的序列参数
    pub fn seq_params(&self) -> SeqParams {
        let mut sps = SeqParams::new(self.width, self.height);
        sps.bit_depth = self.bit_depth;
        sps.chroma_format_idc = self.chroma_format;
        sps.log2_ctb_size = self.log2_ctb_size;
        sps.num_reorder_pics = self.b_frames;
        sps.max_dec_pic_buffering = self.b_frames.saturating_add(2);
        sps
    }
}

/// 一个合成单元在码流中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    Idr,
    Anchor { prev: i32 },
    Bidir { prev: i32, next: i32 },
}

/// 生成合成码流, 每个数据包一个访问单元
///
/// 数据包的 PTS 为全局显示序号, DTS 为解码序号.
pub fn synthesize(config: &StreamConfig) -> ZhenResult<Vec<Packet>> {
    let sps = config.seq_params();
    sps.validate()?;
    if config.gop_size == 0 || config.slices_per_picture == 0 {
        return Err(ZhenError::InvalidArgument(
            "gop_size 与 slices_per_picture 必须大于 0".into(),
        ));
    }

    let max_sample = (1u32 << config.bit_depth) - 1;
    let ctb_count = sps.ctb_count();
    let slice_count = usize::from(config.slices_per_picture).min(ctb_count);
    let gop_size = config.gop_size as i32;
    let step = i32::from(config.b_frames) + 1;

    let mut packets = Vec::new();
    let mut anchor_index = 0u32;
    let mut dts = 0i64;
    for gop in 0..config.gop_count {
        let mut order = vec![(0, UnitKind::Idr)];
        let mut prev = 0;
        loop {
            let next = prev + step;
            if next < gop_size {
                order.push((next, UnitKind::Anchor { prev }));
                order.extend((prev + 1..next).map(|poc| (poc, UnitKind::Bidir { prev, next })));
                prev = next;
            } else {
                order.extend(
                    (prev + 1..gop_size).map(|poc| (poc, UnitKind::Anchor { prev: poc - 1 })),
                );
                break;
            }
        }

        for (poc, kind) in order {
            let pts = i64::from(gop) * i64::from(gop_size) + i64::from(poc);
            let fill = ((dts as u32).wrapping_mul(37).wrapping_add(16)) % (max_sample + 1);
            let unit =
                build_unit(&sps, poc, kind, slice_count, ctb_count).with_fill(fill as u16);
            let decode_index = dts;
            dts += 1;

            if matches!(kind, UnitKind::Anchor { .. }) {
                anchor_index += 1;
                if config.drop_every > 0 && anchor_index % config.drop_every == 0 {
                    continue;
                }
            }
            let mut packet = Packet::from_data(unit.encode()).with_timestamps(pts, decode_index);
            packet.is_keyframe = kind == UnitKind::Idr;
            packets.push(packet);
        }
    }
    Ok(packets)
}

fn build_unit(
    sps: &SeqParams,
    poc: i32,
    kind: UnitKind,
    slice_count: usize,
    ctb_count: usize,
) -> AccessUnit {
    let segment = |i: usize| (i * ctb_count / slice_count) as u16;
    match kind {
        UnitKind::Idr => {
            let slices = (0..slice_count)
                .map(|i| SliceHeader::intra().at(segment(i)))
                .collect();
            AccessUnit::new(NalUnitType::IdrWRadl, 0, sps.clone()).with_slices(slices)
        }
        UnitKind::Anchor { prev } => {
            let slices = (0..slice_count)
                .map(|i| SliceHeader::p(1).at(segment(i)))
                .collect();
            AccessUnit::new(NalUnitType::TrailR, poc, sps.clone())
                .with_short_term(ShortTermRps::new(1, &[(prev - poc, true)]))
                .with_slices(slices)
        }
        UnitKind::Bidir { prev, next } => {
            let slices = (0..slice_count)
                .map(|i| {
                    let slice = SliceHeader::b(1, 1).at(segment(i));
                    if i % 2 == 1 {
                        // L0 候选为 [prev, next], 重排后取 next
                        SliceHeader {
                            nb_refs: [2, 1],
                            ..slice
                        }
                        .with_modification(0, vec![1, 0])
                    } else {
                        slice
                    }
                })
                .collect();
            AccessUnit::new(NalUnitType::TrailN, poc, sps.clone())
                .with_short_term(ShortTermRps::new(
                    1,
                    &[(prev - poc, true), (next - poc, true)],
                ))
                .with_slices(slices)
        }
    }
}
