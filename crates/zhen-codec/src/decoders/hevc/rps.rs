//! 帧级参考图像集 (RPS) 推导与缺失参考帧合成.

use log::{debug, warn};
use zhen_core::{ZhenError, ZhenResult};

use super::dpb::{DPB_SIZE, Dpb, MAX_REFS, RpsType, SEQUENCE_COUNTER_INVALID, mark_ref};
use super::params::{LongTermRef, NalUnitType, ShortTermRps};
use super::picture::{PicFlags, PicId, RefEntry};

impl Dpb {
    /// 由 slice 的短期/长期 RPS 推导五个帧级子集并更新参考标记
    ///
    /// 步骤: 清除上一图像留下的占位帧, 清除除当前图像外所有图像的参考标记,
    /// 逐项查找参考帧 (找不到时合成占位帧) 并重新标记, 最后释放不再使用的图像.
    /// `short_term` 为 `None` (IDR) 时只清空子集.
    pub fn frame_rps(
        &mut self,
        short_term: Option<&ShortTermRps>,
        long_term: &[LongTermRef],
        nal_type: NalUnitType,
    ) -> ZhenResult<()> {
        for list in &mut self.rps {
            list.clear();
        }
        let Some(short_term) = short_term else {
            return Ok(());
        };

        self.unref_missing_refs();

        let current = self.current;
        for (index, frame) in self.frames.iter_mut().enumerate() {
            if Some(PicId(index)) != current {
                mark_ref(frame, PicFlags::empty());
            }
        }

        let result = self.add_rps_entries(short_term, long_term, nal_type);

        // 释放不再被引用的图像
        for index in 0..DPB_SIZE {
            self.unref(PicId(index), PicFlags::empty());
        }
        result
    }

    fn add_rps_entries(
        &mut self,
        short_term: &ShortTermRps,
        long_term: &[LongTermRef],
        nal_type: NalUnitType,
    ) -> ZhenResult<()> {
        for (i, entry) in short_term.entries.iter().enumerate() {
            let poc = self.poc.wrapping_add(entry.delta_poc);
            let list = if !entry.used {
                RpsType::StFoll
            } else if i < usize::from(short_term.num_negative_pics) {
                RpsType::StCurrBef
            } else {
                RpsType::StCurrAft
            };
            self.add_candidate_ref(list, poc, PicFlags::SHORT_REF, true, nal_type)?;
        }

        for entry in long_term {
            let list = if entry.used {
                RpsType::LtCurr
            } else {
                RpsType::LtFoll
            };
            self.add_candidate_ref(
                list,
                entry.poc,
                PicFlags::LONG_REF,
                entry.poc_msb_present,
                nal_type,
            )?;
        }
        Ok(())
    }

    /// 查找参考帧并加入子集, 找不到时合成占位帧
    fn add_candidate_ref(
        &mut self,
        list: RpsType,
        poc: i32,
        flag: PicFlags,
        use_msb: bool,
        nal_type: NalUnitType,
    ) -> ZhenResult<()> {
        let found = self.find_ref_idx(poc, use_msb, nal_type);
        if found.is_some() && found == self.current {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: RPS 引用了当前图像 (POC {})",
                poc
            )));
        }
        if self.rps[list as usize].len() >= MAX_REFS {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: RPS 子集 {:?} 超过 {} 项",
                list, MAX_REFS
            )));
        }

        let id = match found {
            Some(id) => id,
            None => self.generate_missing_ref(poc)?,
        };
        let frame = &mut self.frames[id.0];
        let entry = RefEntry {
            poc: frame.poc,
            pic: id,
            is_long_term: flag == PicFlags::LONG_REF,
        };
        mark_ref(frame, flag);
        self.rps[list as usize].push(entry);
        Ok(())
    }

    /// 在当前解码序列中按 POC 查找参考帧
    ///
    /// `use_msb` 为假时只比较 POC 低 `log2_max_poc_lsb` 位, 并排除当前 POC.
    fn find_ref_idx(&self, poc: i32, use_msb: bool, nal_type: NalUnitType) -> Option<PicId> {
        let mask = if use_msb {
            !0
        } else {
            let log2 = self.sps.as_ref().map_or(16, |sps| sps.log2_max_poc_lsb);
            (1i32 << log2) - 1
        };
        let found = self.live_frames().find(|(_, frame)| {
            frame.sequence == self.seq_decode
                && (frame.poc & mask) == poc
                && (use_msb || frame.poc != self.poc)
        });
        if found.is_none() && nal_type != NalUnitType::Cra && !nal_type.is_bla() {
            warn!("找不到 POC {} 的参考帧", poc);
        }
        found.map(|(id, _)| id)
    }

    /// 合成缺失的参考帧
    ///
    /// 所有平面填充中间电平 `1 << (bit_depth - 1)`, 序列号为无效值,
    /// 进度直接标记完成. 下一次 `frame_rps` 时被清除.
    pub fn generate_missing_ref(&mut self, poc: i32) -> ZhenResult<PicId> {
        let id = self.alloc_frame(true)?;
        let frame = &mut self.frames[id.0];
        frame.poc = poc;
        frame.sequence = SEQUENCE_COUNTER_INVALID;
        frame.flags = PicFlags::empty();
        debug!("合成缺失参考帧 POC {}", poc);
        Ok(id)
    }

    /// 释放所有占位帧
    pub(super) fn unref_missing_refs(&mut self) {
        for index in 0..DPB_SIZE {
            let frame = &self.frames[index];
            if frame.is_live() && frame.sequence == SEQUENCE_COUNTER_INVALID {
                self.unref(PicId(index), PicFlags::all());
            }
        }
    }

    /// 当前图像实际使用的参考帧数
    pub fn frame_nb_refs(
        short_term: Option<&ShortTermRps>,
        long_term: &[LongTermRef],
        curr_pic_ref: bool,
    ) -> usize {
        let short = short_term.map_or(0, |rps| rps.entries.iter().filter(|e| e.used).count());
        let long = long_term.iter().filter(|e| e.used).count();
        short + long + usize::from(curr_pic_ref)
    }
}
