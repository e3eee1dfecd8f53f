//! 按 CTB 行重建图像样本.
//!
//! 每个输出采样是基准值与所有不同参考帧同位置采样的四舍五入均值.
//! 读取参考帧的某一行之前先等待该参考帧的进度到达这一行.

use std::sync::Arc;

use zhen_core::{ZhenError, ZhenResult};

use super::dpb::Dpb;
use super::picture::{PicId, PictureBuffer};
use crate::frame_thread::PROGRESS_DONE;

/// 重建当前图像, 每完成一个 CTB 行上报一次进度, 结束时上报完成
pub(super) fn reconstruct(dpb: &Dpb, current: PicId, fill: u16) -> ZhenResult<()> {
    let buffer = dpb
        .frame(current)
        .and_then(|frame| frame.buffer())
        .cloned()
        .ok_or_else(|| ZhenError::Internal("重建: 当前图像没有缓冲区".into()))?;
    let result = reconstruct_rows(dpb, current, &buffer, fill);
    // 出错时同样上报完成, 等待该图像的线程才能继续
    buffer.progress().report(PROGRESS_DONE, 0);
    result
}

fn reconstruct_rows(
    dpb: &Dpb,
    current: PicId,
    buffer: &PictureBuffer,
    fill: u16,
) -> ZhenResult<()> {
    let sps = dpb
        .sps()
        .ok_or_else(|| ZhenError::Internal("重建: DPB 未激活序列参数".into()))?;
    let ctb_size = sps.ctb_size() as usize;
    let height = usize::from(sps.height);
    let (sub_x, sub_y) = buffer.pixel_format().chroma_subsampling();

    for ctb_y in 0..sps.ctb_height() {
        let y0 = ctb_y * ctb_size;
        let y1 = (y0 + ctb_size).min(height);

        // 每个 CTB 列使用的参考帧
        let mut column_refs: Vec<Vec<usize>> = Vec::with_capacity(sps.ctb_width());
        let mut row_refs: Vec<(PicId, Arc<PictureBuffer>)> = Vec::new();
        for ctb_x in 0..sps.ctb_width() {
            let mut refs = Vec::new();
            if let Some(lists) = dpb.ref_list_at(current, (ctb_x * ctb_size) as u32, y0 as u32) {
                for entry in lists.iter().flat_map(|list| list.iter()) {
                    if entry.pic == current {
                        continue;
                    }
                    let index = match row_refs.iter().position(|(pic, _)| *pic == entry.pic) {
                        Some(index) => index,
                        None => {
                            let Some(ref_buffer) =
                                dpb.frame(entry.pic).and_then(|frame| frame.buffer())
                            else {
                                continue;
                            };
                            check_geometry(buffer, ref_buffer, entry.poc)?;
                            row_refs.push((entry.pic, Arc::clone(ref_buffer)));
                            row_refs.len() - 1
                        }
                    };
                    if !refs.contains(&index) {
                        refs.push(index);
                    }
                }
            }
            column_refs.push(refs);
        }

        for (_, ref_buffer) in &row_refs {
            ref_buffer.progress().wait((y1 - 1) as i32, 0);
        }

        for plane in 0..buffer.plane_count() {
            let (shift_x, shift_y) = if plane == 0 { (0, 0) } else { (sub_x, sub_y) };
            let (plane_width, plane_rows) = buffer.plane_dims(plane);
            let py0 = y0 >> shift_y;
            let py1 = y1.div_ceil(1 << shift_y).min(plane_rows);
            if py0 >= py1 {
                continue;
            }
            let ref_rows: Vec<Vec<u16>> = row_refs
                .iter()
                .map(|(_, ref_buffer)| ref_buffer.read_rows(plane, py0, py1))
                .collect();

            let mut out = Vec::with_capacity(plane_width * (py1 - py0));
            for row in 0..py1 - py0 {
                for x in 0..plane_width {
                    let refs = &column_refs[((x << shift_x) / ctb_size).min(column_refs.len() - 1)];
                    let offset = row * plane_width + x;
                    let sum: u32 = u32::from(fill)
                        + refs
                            .iter()
                            .map(|&index| u32::from(ref_rows[index][offset]))
                            .sum::<u32>();
                    let count = 1 + refs.len() as u32;
                    out.push(((sum + count / 2) / count) as u16);
                }
            }
            buffer.write_rows(plane, py0, &out);
        }

        buffer.progress().report((y1 - 1) as i32, 0);
    }
    Ok(())
}

fn check_geometry(current: &PictureBuffer, reference: &PictureBuffer, poc: i32) -> ZhenResult<()> {
    if current.width() != reference.width()
        || current.height() != reference.height()
        || current.pixel_format() != reference.pixel_format()
    {
        return Err(ZhenError::InvalidData(format!(
            "HEVC: 参考帧 POC {} 尺寸 {}x{} 与当前图像 {}x{} 不一致",
            poc,
            reference.width(),
            reference.height(),
            current.width(),
            current.height()
        )));
    }
    Ok(())
}
