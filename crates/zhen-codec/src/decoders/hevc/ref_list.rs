//! slice 级参考图像列表 (L0/L1) 构建.

use log::error;
use zhen_core::{ZhenError, ZhenResult};

use super::dpb::{Dpb, MAX_REFS, RpsType};
use super::params::{SliceHeader, SliceType};
use super::picture::{PicId, RefEntry, RefPicList};

impl Dpb {
    /// 为当前图像的第 `slice_idx` 个 slice 构建参考列表
    ///
    /// 先校验全部输入, 再写入当前图像. 返回错误时当前图像的参考列表与
    /// CTB 映射表保持不变.
    pub fn slice_rpl(
        &mut self,
        slice: &SliceHeader,
        slice_idx: usize,
        curr_pic_ref: bool,
    ) -> ZhenResult<()> {
        let current = self
            .current
            .ok_or_else(|| ZhenError::Internal("slice_rpl: 没有正在解码的图像".into()))?;
        let ctb_addr_ts = self.init_slice_rpl(current, slice, slice_idx)?;
        for list in 0..2 {
            if usize::from(slice.nb_refs[list]) > MAX_REFS {
                return Err(ZhenError::InvalidData(format!(
                    "HEVC: num_ref_idx_l{}={} 超过 {}",
                    list, slice.nb_refs[list], MAX_REFS
                )));
            }
        }

        if slice.slice_type == SliceType::I {
            self.commit_slice_rpl(current, ctb_addr_ts, slice_idx, Default::default(), None);
            return Ok(());
        }

        let nb_candidates = self.rps(RpsType::StCurrBef).len()
            + self.rps(RpsType::StCurrAft).len()
            + self.rps(RpsType::LtCurr).len();
        if nb_candidates == 0 && !curr_pic_ref {
            error!("帧级 RPS 中没有可用参考帧");
            return Err(ZhenError::ZeroRefs);
        }

        let current_entry = RefEntry {
            poc: self.poc,
            pic: current,
            is_long_term: true,
        };
        let mut lists: [RefPicList; 2] = Default::default();
        let mut collocated = None;

        for list_idx in 0..slice.slice_type.nb_lists() {
            let nb_refs = usize::from(slice.nb_refs[list_idx]);
            let candidates =
                self.candidate_list(list_idx, nb_refs, curr_pic_ref.then_some(current_entry));
            let rpl = &mut lists[list_idx];

            match &slice.list_entry[list_idx] {
                Some(entries) => {
                    for i in 0..nb_refs {
                        let Some(index) = entries.get(i).copied().map(usize::from) else {
                            return Err(ZhenError::InvalidData(format!(
                                "HEVC: L{} 重排序列表只有 {} 项",
                                list_idx,
                                entries.len()
                            )));
                        };
                        let Some(entry) = candidates.get(index) else {
                            error!(
                                "参考索引无效: L{}[{}] = {}, 候选 {} 项",
                                list_idx,
                                i,
                                index,
                                candidates.len()
                            );
                            return Err(ZhenError::InvalidRefIndex {
                                list: list_idx,
                                index,
                                available: candidates.len(),
                            });
                        };
                        rpl.push(*entry);
                    }
                }
                None => {
                    for entry in candidates.iter().take(nb_refs) {
                        rpl.push(*entry);
                    }
                    // 式 8-9: 当前图像占据 L0 的最后一项
                    if list_idx == 0 && curr_pic_ref && nb_refs > 0 && candidates.len() > nb_refs {
                        rpl.set(nb_refs - 1, current_entry);
                    }
                }
            }

            if usize::from(slice.collocated_list) == list_idx {
                if let Some(entry) = rpl.get(usize::from(slice.collocated_ref_idx)) {
                    collocated = Some(entry.pic);
                }
            }
        }

        self.commit_slice_rpl(current, ctb_addr_ts, slice_idx, lists, collocated);
        Ok(())
    }

    /// 校验 slice 起始地址与序号, 返回起始 CTB 的 tile 扫描地址
    fn init_slice_rpl(
        &self,
        current: PicId,
        slice: &SliceHeader,
        slice_idx: usize,
    ) -> ZhenResult<usize> {
        let sps = self
            .sps
            .as_ref()
            .ok_or_else(|| ZhenError::Internal("DPB 未激活序列参数".into()))?;
        let ctb_count = self.frames[current.0].rpl_tab.len();
        let ctb_addr_ts = sps.rs_to_ts(usize::from(slice.segment_addr));
        if ctb_addr_ts >= ctb_count {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: slice_segment_addr={} 超出 CTB 数量 {}",
                slice.segment_addr, ctb_count
            )));
        }
        if slice_idx >= ctb_count || slice_idx > usize::from(u16::MAX) {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: slice 序号 {} 超出 CTB 数量 {}",
                slice_idx, ctb_count
            )));
        }
        Ok(ctb_addr_ts)
    }

    /// 按 L0 (BEF, AFT, LT) 或 L1 (AFT, BEF, LT) 顺序拼接候选列表,
    /// 不足 `nb_refs` 时循环重复
    fn candidate_list(
        &self,
        list_idx: usize,
        nb_refs: usize,
        current_entry: Option<RefEntry>,
    ) -> Vec<RefEntry> {
        let order = if list_idx == 0 {
            [RpsType::StCurrBef, RpsType::StCurrAft, RpsType::LtCurr]
        } else {
            [RpsType::StCurrAft, RpsType::StCurrBef, RpsType::LtCurr]
        };

        let mut candidates = Vec::with_capacity(MAX_REFS);
        while candidates.len() < nb_refs {
            let before = candidates.len();
            for kind in order {
                for entry in self.rps(kind).iter() {
                    if candidates.len() >= MAX_REFS {
                        break;
                    }
                    candidates.push(RefEntry {
                        is_long_term: kind == RpsType::LtCurr,
                        ..*entry
                    });
                }
            }
            if let Some(entry) = current_entry {
                if candidates.len() < MAX_REFS {
                    candidates.push(entry);
                }
            }
            if candidates.len() == before {
                break;
            }
        }
        candidates
    }

    fn commit_slice_rpl(
        &mut self,
        current: PicId,
        ctb_addr_ts: usize,
        slice_idx: usize,
        lists: [RefPicList; 2],
        collocated: Option<PicId>,
    ) {
        let frame = &mut self.frames[current.0];
        for entry in &mut frame.rpl_tab[ctb_addr_ts..] {
            *entry = slice_idx as u16;
        }
        if frame.rpl.len() <= slice_idx {
            frame.rpl.resize_with(slice_idx + 1, Default::default);
        }
        frame.rpl[slice_idx] = lists;
        if collocated.is_some() {
            frame.collocated = collocated;
        }
    }

    /// 覆盖亮度坐标 `(x0, y0)` 的 slice 的参考列表
    pub fn ref_list_at(&self, pic: PicId, x0: u32, y0: u32) -> Option<&[RefPicList; 2]> {
        let sps = self.sps.as_ref()?;
        let frame = self.frame(pic)?;
        let log2 = u32::from(sps.log2_ctb_size);
        let ctb_addr_rs = (y0 >> log2) as usize * sps.ctb_width() + (x0 >> log2) as usize;
        let slice_idx = *frame.rpl_tab.get(sps.rs_to_ts(ctb_addr_rs))?;
        frame.ref_lists(usize::from(slice_idx))
    }
}
