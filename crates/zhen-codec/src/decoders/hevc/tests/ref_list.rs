use std::sync::Arc;

use zhen_core::ZhenError;

use super::super::{Dpb, LongTermRef, NalUnitType, PicId, SeqParams, ShortTermRps, SliceHeader};
use super::helpers::*;

/// 当前图像 POC 8, ST_CURR_BEF = [4, 2], ST_CURR_AFT = [12], LT_CURR = [0]
fn dpb_with_pools() -> (Dpb, PicId) {
    let mut dpb = new_dpb(&test_sps());
    for poc in [0, 2, 4, 12] {
        push_ref(&mut dpb, poc);
    }
    let current = dpb.set_new_ref(8, true).unwrap();
    let rps = ShortTermRps::new(2, &[(-4, true), (-6, true), (4, true)]);
    let lt = [LongTermRef {
        poc: 0,
        used: true,
        poc_msb_present: true,
    }];
    dpb.frame_rps(Some(&rps), &lt, NalUnitType::TrailR).unwrap();
    (dpb, current)
}

fn lists(dpb: &Dpb, current: PicId, slice_idx: usize) -> [Vec<i32>; 2] {
    let rpl = dpb.frame(current).unwrap().ref_lists(slice_idx).unwrap();
    [rpl[0].pocs(), rpl[1].pocs()]
}

#[test]
fn test_p_slice_candidate_order() {
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::p(3), 0, false).unwrap();
    assert_eq!(lists(&dpb, current, 0), [vec![4, 2, 12], vec![]]);
}

#[test]
fn test_b_slice_candidate_order() {
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::b(4, 4), 0, false).unwrap();
    assert_eq!(lists(&dpb, current, 0), [vec![4, 2, 12, 0], vec![12, 4, 2, 0]]);

    let rpl = dpb.frame(current).unwrap().ref_lists(0).unwrap();
    let long_term: Vec<bool> = rpl[1].iter().map(|entry| entry.is_long_term).collect();
    assert_eq!(long_term, vec![false, false, false, true]);
}

#[test]
fn test_candidates_repeat_until_requested_count() {
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::p(6), 0, false).unwrap();
    assert_eq!(lists(&dpb, current, 0)[0], vec![4, 2, 12, 0, 4, 2]);
}

#[test]
fn test_explicit_modification() {
    let (mut dpb, current) = dpb_with_pools();
    let slice = SliceHeader::b(2, 1)
        .with_modification(0, vec![3, 2])
        .with_modification(1, vec![1]);
    dpb.slice_rpl(&slice, 0, false).unwrap();
    assert_eq!(lists(&dpb, current, 0), [vec![0, 12], vec![4]]);
}

#[test]
fn test_invalid_ref_index_leaves_dpb_unchanged() {
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::p(1), 0, false).unwrap();
    let before = dpb_snapshot(&dpb);
    let lists_before = lists(&dpb, current, 0);

    // L0 候选为 [4, 2, 12, 0], 索引 4 越界
    let slice = SliceHeader::b(2, 1)
        .at(2)
        .with_modification(0, vec![0, 4]);
    let err = dpb.slice_rpl(&slice, 1, false).unwrap_err();
    match err {
        ZhenError::InvalidRefIndex {
            list,
            index,
            available,
        } => {
            assert_eq!(list, 0);
            assert_eq!(index, 4);
            assert_eq!(available, 4);
        }
        other => panic!("应返回 InvalidRefIndex, 实际 {}", other),
    }

    assert_eq!(dpb_snapshot(&dpb), before);
    assert_eq!(lists(&dpb, current, 0), lists_before);
    let frame = dpb.frame(current).unwrap();
    assert!(frame.ref_lists(1).is_none());
    assert_eq!(dpb.ref_list_at(current, 0, 16).map(|l| l[0].pocs()), Some(vec![4]));
}

#[test]
fn test_zero_refs() {
    let mut dpb = new_dpb(&test_sps());
    let current = dpb.set_new_ref(3, true).unwrap();
    dpb.frame_rps(Some(&ShortTermRps::default()), &[], NalUnitType::TrailR)
        .unwrap();

    let err = dpb.slice_rpl(&SliceHeader::p(1), 0, false).unwrap_err();
    assert!(matches!(err, ZhenError::ZeroRefs));
    assert!(err.is_data_error());

    // 当前图像可作为参考时以长期参考加入候选
    dpb.slice_rpl(&SliceHeader::p(2), 0, true).unwrap();
    let rpl = dpb.frame(current).unwrap().ref_lists(0).unwrap();
    assert_eq!(rpl[0].pocs(), vec![3, 3]);
    assert!(rpl[0].iter().all(|entry| entry.is_long_term && entry.pic == current));
}

#[test]
fn test_current_picture_replaces_last_l0_entry() {
    let (mut dpb, current) = dpb_with_pools();
    // 候选: [4, 2, 12, 0, cur], 截断为 2 项后最后一项替换为当前图像
    dpb.slice_rpl(&SliceHeader::p(2), 0, true).unwrap();
    let rpl = dpb.frame(current).unwrap().ref_lists(0).unwrap();
    assert_eq!(rpl[0].pocs(), vec![4, 8]);
    assert_eq!(rpl[0].get(1).unwrap().pic, current);

    // 显式重排时不替换
    let slice = SliceHeader::p(2).with_modification(0, vec![0, 1]);
    dpb.slice_rpl(&slice, 0, true).unwrap();
    assert_eq!(lists(&dpb, current, 0)[0], vec![4, 2]);
}

#[test]
fn test_collocated_reference() {
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::b(1, 2).with_collocated(1, 1), 0, false)
        .unwrap();
    let collocated = dpb.frame(current).unwrap().collocated().unwrap();
    assert_eq!(dpb.frame(collocated).unwrap().poc, 4);

    // 越界的 collocated_ref_idx 不记录
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::p(1).with_collocated(0, 5), 0, false)
        .unwrap();
    assert!(dpb.frame(current).unwrap().collocated().is_none());
}

#[test]
fn test_intra_slice_only_fills_ctb_table() {
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::p(1), 0, false).unwrap();
    dpb.slice_rpl(&SliceHeader::intra().at(3), 1, false).unwrap();
    assert_eq!(lists(&dpb, current, 1), [Vec::<i32>::new(), Vec::<i32>::new()]);
    assert_eq!(dpb.ref_list_at(current, 16, 16).map(|l| l[0].len()), Some(0));
    assert_eq!(dpb.ref_list_at(current, 0, 0).map(|l| l[0].pocs()), Some(vec![4]));
}

#[test]
fn test_ref_list_at_follows_slices() {
    let (mut dpb, current) = dpb_with_pools();
    dpb.slice_rpl(&SliceHeader::p(1), 0, false).unwrap();
    dpb.slice_rpl(&SliceHeader::b(1, 1).at(2), 1, false).unwrap();

    // 32x32, CTB 16: CTB 0, 1 属于 slice 0; CTB 2, 3 属于 slice 1
    let l0_at = |x, y| dpb.ref_list_at(current, x, y).map(|l| (l[0].pocs(), l[1].pocs()));
    assert_eq!(l0_at(0, 0), Some((vec![4], vec![])));
    assert_eq!(l0_at(31, 15), Some((vec![4], vec![])));
    assert_eq!(l0_at(0, 16), Some((vec![4], vec![12])));
    assert_eq!(l0_at(31, 31), Some((vec![4], vec![12])));
}

#[test]
fn test_ref_list_at_tile_scan() {
    let mut sps = test_sps();
    // 两个纵向 tile: 光栅地址 [0, 1, 2, 3] -> tile 扫描地址 [0, 2, 1, 3]
    sps.ctb_addr_rs_to_ts = Some(Arc::from(vec![0u32, 2, 1, 3]));
    let mut dpb = new_dpb(&sps);
    push_ref(&mut dpb, 0);
    let current = dpb.set_new_ref(1, true).unwrap();
    let rps = ShortTermRps::new(1, &[(-1, true)]);
    dpb.frame_rps(Some(&rps), &[], NalUnitType::TrailR).unwrap();

    dpb.slice_rpl(&SliceHeader::intra(), 0, false).unwrap();
    dpb.slice_rpl(&SliceHeader::p(1).at(1), 1, false).unwrap();

    let len_at = |x, y| dpb.ref_list_at(current, x, y).map(|l| l[0].len());
    assert_eq!(len_at(0, 0), Some(0));
    assert_eq!(len_at(0, 16), Some(0), "光栅地址 2 在 tile 扫描顺序中位于 slice 1 之前");
    assert_eq!(len_at(16, 0), Some(1));
    assert_eq!(len_at(16, 16), Some(1));
}

#[test]
fn test_invalid_slice_address() {
    let (mut dpb, _) = dpb_with_pools();
    let err = dpb
        .slice_rpl(&SliceHeader::p(1).at(4), 0, false)
        .unwrap_err();
    assert!(matches!(err, ZhenError::InvalidData(_)));

    let err = dpb.slice_rpl(&SliceHeader::p(1), 4, false).unwrap_err();
    assert!(matches!(err, ZhenError::InvalidData(_)));
}

#[test]
fn test_too_many_refs_rejected() {
    let (mut dpb, _) = dpb_with_pools();
    let err = dpb.slice_rpl(&SliceHeader::p(17), 0, false).unwrap_err();
    assert!(matches!(err, ZhenError::InvalidData(_)));
}

#[test]
fn test_slice_rpl_without_current() {
    let mut dpb = new_dpb(&SeqParams::new(16, 16));
    assert!(dpb.slice_rpl(&SliceHeader::intra(), 0, false).is_err());
}
