//! 显示顺序输出与 DPB 容量控制 (bumping).

use std::sync::Arc;

use log::debug;

use super::dpb::{DPB_SIZE, Dpb, OutputPicture, SEQUENCE_COUNTER_MASK};
use super::picture::{PicFlags, PicId};

impl Dpb {
    /// IRAP 且 NoRaslOutputFlag 时处理旧序列中尚未输出的图像
    ///
    /// `no_output_of_prior_pics` 为真时直接丢弃, 否则标记 BUMPING 尽快输出.
    pub fn prepare_irap_output(&mut self, no_output_of_prior_pics: bool) {
        let mask = PicFlags::BUMPING | PicFlags::OUTPUT;
        for index in 0..DPB_SIZE {
            let frame = &mut self.frames[index];
            if !frame.is_live()
                || (frame.flags & mask) != PicFlags::OUTPUT
                || frame.sequence == self.seq_decode
            {
                continue;
            }
            if no_output_of_prior_pics {
                debug!("丢弃旧序列未输出图像 POC {}", frame.poc);
                self.unref(PicId(index), PicFlags::OUTPUT);
            } else {
                frame.flags.insert(PicFlags::BUMPING);
            }
        }
    }

    /// 取出下一个按显示顺序输出的图像
    ///
    /// 非 `flush` 模式下, 输出序列与解码序列相同且等待输出的图像数不超过
    /// `num_reorder_pics` 时返回 `None`. 输出序列落后于解码序列且没有可输出图像时,
    /// 推进输出序列后重试.
    pub fn output_next(&mut self, flush: bool) -> Option<OutputPicture> {
        loop {
            let mut nb_output = 0usize;
            let mut min: Option<(PicId, i32)> = None;
            for (id, frame) in self.live_frames() {
                if frame.flags.contains(PicFlags::OUTPUT) && frame.sequence == self.seq_output {
                    nb_output += 1;
                    if min.is_none_or(|(_, poc)| frame.poc < poc) {
                        min = Some((id, frame.poc));
                    }
                }
            }

            if !flush && self.seq_output == self.seq_decode {
                if let Some(sps) = &self.sps {
                    if nb_output <= usize::from(sps.num_reorder_pics) {
                        return None;
                    }
                }
            }

            if let Some((id, _)) = min {
                let frame = &self.frames[id.0];
                let buffer = frame.buffer.as_ref().map(Arc::clone)?;
                let picture = OutputPicture {
                    poc: frame.poc,
                    pts: frame.pts,
                    is_keyframe: frame.is_keyframe,
                    buffer,
                };
                let mask = if frame.flags.contains(PicFlags::BUMPING) {
                    PicFlags::OUTPUT | PicFlags::BUMPING
                } else {
                    PicFlags::OUTPUT
                };
                self.unref(id, mask);
                debug!("输出 POC {}", picture.poc);
                return Some(picture);
            }

            if self.seq_output == self.seq_decode {
                return None;
            }
            self.seq_output = (self.seq_output + 1) & SEQUENCE_COUNTER_MASK;
        }
    }

    /// DPB 达到 `max_dec_pic_buffering` 时标记最早的待输出图像为 BUMPING
    ///
    /// 返回被标记的图像数.
    pub fn bump(&mut self) -> usize {
        let Some(sps) = &self.sps else {
            return 0;
        };
        let in_output_seq = |flags: PicFlags, sequence: u16, poc: i32| {
            !flags.is_empty() && sequence == self.seq_output && poc != self.poc
        };
        let dpb = self
            .live_frames()
            .filter(|(_, frame)| in_output_seq(frame.flags, frame.sequence, frame.poc))
            .count();
        if dpb < usize::from(sps.max_dec_pic_buffering) {
            return 0;
        }

        let min_poc = self
            .live_frames()
            .filter(|(_, frame)| {
                in_output_seq(frame.flags, frame.sequence, frame.poc)
                    && frame.flags == PicFlags::OUTPUT
            })
            .map(|(_, frame)| frame.poc)
            .min()
            .unwrap_or(i32::MAX);

        let seq_output = self.seq_output;
        let mut flagged = 0;
        for frame in self.frames.iter_mut().filter(|frame| frame.is_live()) {
            if frame.flags.contains(PicFlags::OUTPUT)
                && frame.sequence == seq_output
                && frame.poc <= min_poc
            {
                frame.flags.insert(PicFlags::BUMPING);
                flagged += 1;
            }
        }
        debug!("DPB 已满 ({} 帧), 标记 {} 帧 bumping", dpb, flagged);
        flagged
    }
}
