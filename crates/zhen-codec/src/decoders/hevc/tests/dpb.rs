use zhen_core::{PixelFormat, ZhenError};

use super::super::{DPB_SIZE, Dpb, PicFlags, RefKind, SEQUENCE_COUNTER_INVALID};
use super::helpers::*;
use crate::frame_thread::PROGRESS_DONE;

#[test]
fn test_allocate_until_full() {
    let mut dpb = new_dpb(&test_sps());
    for poc in 0..DPB_SIZE as i32 {
        let id = dpb.allocate(poc).unwrap();
        let frame = dpb.frame(id).unwrap();
        assert_eq!(frame.poc, poc);
        assert_eq!(frame.flags, PicFlags::empty());
        assert_eq!(frame.sequence, dpb.seq_decode());
    }
    assert_eq!(dpb.live_count(), DPB_SIZE);

    let err = dpb.allocate(100).unwrap_err();
    assert!(matches!(err, ZhenError::DpbFull), "DPB 满时应返回 DpbFull: {}", err);
    assert!(err.is_resource_error());
    assert_eq!(dpb.live_count(), DPB_SIZE, "分配失败不应改变 DPB");
}

#[test]
fn test_allocate_without_sps() {
    let mut dpb = Dpb::new();
    assert!(dpb.allocate(0).is_err());
    assert_eq!(dpb.live_count(), 0);
}

#[test]
fn test_duplicate_poc_within_sequence() {
    let mut dpb = new_dpb(&test_sps());
    push_ref(&mut dpb, 4);
    let before = dpb_snapshot(&dpb);

    let err = dpb.allocate(4).unwrap_err();
    assert!(matches!(err, ZhenError::DuplicatePoc(4)));
    assert!(err.is_data_error());
    assert_eq!(dpb_snapshot(&dpb), before);

    // 新序列中可以复用同一个 POC
    dpb.new_sequence();
    let id = dpb.allocate(4).unwrap();
    assert_eq!(dpb.frame(id).unwrap().sequence, dpb.seq_decode());
    assert_eq!(dpb.live_count(), 2);
}

#[test]
fn test_sequence_counter_wraps() {
    let mut dpb = new_dpb(&test_sps());
    for _ in 0..256 {
        dpb.new_sequence();
    }
    assert_eq!(dpb.seq_decode(), 0);
    dpb.new_sequence();
    assert_eq!(dpb.seq_decode(), 1);
}

#[test]
fn test_set_reference_kinds() {
    let mut dpb = new_dpb(&test_sps());
    let id = push_picture(&mut dpb, 3, PicFlags::OUTPUT);

    dpb.set_reference(3, RefKind::Short);
    assert_eq!(dpb.frame(id).unwrap().flags, PicFlags::OUTPUT | PicFlags::SHORT_REF);

    dpb.set_reference(3, RefKind::Long);
    assert_eq!(dpb.frame(id).unwrap().flags, PicFlags::OUTPUT | PicFlags::LONG_REF);

    dpb.set_reference(3, RefKind::Unused);
    assert_eq!(dpb.frame(id).unwrap().flags, PicFlags::OUTPUT);

    // 不存在的 POC 忽略
    dpb.set_reference(99, RefKind::Short);
    assert_eq!(dpb.live_count(), 1);
}

#[test]
fn test_set_reference_unused_releases_picture() {
    let mut dpb = new_dpb(&test_sps());
    let id = push_ref(&mut dpb, 1);
    dpb.set_reference(1, RefKind::Unused);
    assert!(dpb.frame(id).is_none());
    assert_eq!(dpb.live_count(), 0);
}

#[test]
fn test_clear_refs_keeps_pending_output() {
    let mut dpb = new_dpb(&test_sps());
    let waiting = push_picture(&mut dpb, 0, PicFlags::OUTPUT | PicFlags::SHORT_REF);
    let reference = push_picture(&mut dpb, 1, PicFlags::LONG_REF);

    dpb.clear_refs();
    assert_eq!(dpb.frame(waiting).unwrap().flags, PicFlags::OUTPUT);
    assert!(dpb.frame(reference).is_none());
}

#[test]
fn test_unref_mask() {
    let mut dpb = new_dpb(&test_sps());
    let id = push_picture(&mut dpb, 0, PicFlags::OUTPUT | PicFlags::BUMPING);
    dpb.unref(id, PicFlags::BUMPING);
    assert!(dpb.frame(id).is_some());
    dpb.unref(id, PicFlags::OUTPUT);
    assert!(dpb.frame(id).is_none());

    // 已释放的槽位再次 unref 不受影响
    dpb.unref(id, PicFlags::all());
    assert_eq!(dpb.live_count(), 0);
}

#[test]
fn test_set_new_ref_and_drop_current() {
    let mut dpb = new_dpb(&test_sps());
    let id = dpb.set_new_ref(7, true).unwrap();
    assert_eq!(dpb.current(), Some(id));
    assert_eq!(dpb.current_poc(), 7);
    assert_eq!(
        dpb.frame(id).unwrap().flags,
        PicFlags::OUTPUT | PicFlags::SHORT_REF
    );
    let buffer = dpb.frame(id).unwrap().buffer().unwrap().clone();
    assert!(!buffer.progress().is_done());

    dpb.drop_current();
    assert!(dpb.current().is_none());
    assert!(dpb.frame(id).is_none());
    assert_eq!(buffer.progress().get(0), PROGRESS_DONE);

    let id = dpb.set_new_ref(8, false).unwrap();
    assert_eq!(dpb.frame(id).unwrap().flags, PicFlags::SHORT_REF);
}

#[test]
fn test_flush_dpb_releases_everything() {
    let mut dpb = new_dpb(&test_sps());
    push_ref(&mut dpb, 0);
    push_picture(&mut dpb, 1, PicFlags::OUTPUT);
    dpb.set_new_ref(2, true).unwrap();

    dpb.flush_dpb();
    assert_eq!(dpb.live_count(), 0);
    assert!(dpb.current().is_none());
}

#[test]
fn test_generate_missing_ref() {
    let mut sps = test_sps();
    sps.bit_depth = 10;
    let mut dpb = new_dpb(&sps);
    let id = dpb.generate_missing_ref(12).unwrap();

    let frame = dpb.frame(id).unwrap();
    assert_eq!(frame.poc, 12);
    assert_eq!(frame.sequence, SEQUENCE_COUNTER_INVALID);
    assert_eq!(frame.flags, PicFlags::empty());

    let buffer = frame.buffer().unwrap();
    assert_eq!(buffer.pixel_format(), PixelFormat::Yuv420p10le);
    assert!(buffer.progress().is_done());
    for plane in 0..buffer.plane_count() {
        let (width, rows) = buffer.plane_dims(plane);
        assert_eq!(buffer.sample(plane, 0, 0), 512);
        assert_eq!(buffer.sample(plane, width - 1, rows - 1), 512);
    }

    // 占位帧不属于任何解码序列
    assert!(dpb.find(12).is_none());
}

#[test]
fn test_dpb_clone_shares_buffers() {
    let mut dpb = new_dpb(&test_sps());
    let id = push_ref(&mut dpb, 0);
    let copy = dpb.clone();
    let a = dpb.frame(id).unwrap().buffer().unwrap();
    let b = copy.frame(id).unwrap().buffer().unwrap();
    assert!(std::sync::Arc::ptr_eq(a, b));

    dpb.flush_dpb();
    assert_eq!(copy.live_count(), 1, "副本的元数据独立");
}
