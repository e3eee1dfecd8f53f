use zhen_core::ZhenError;

use crate::decoder::Decoder;
use crate::frame::VideoFrame;
use crate::frame_thread::{FrameThreadConfig, FrameThreadDecoder};
use crate::packet::Packet;

use super::super::{AccessUnit, Dpb, HevcDecoder, PicFlags, PicId, SeqParams};

/// 32x32, CTB 16 (2x2 个 CTB), 重排深度 2, max_dec_pic_buffering 6
pub fn test_sps() -> SeqParams {
    SeqParams::new(32, 32)
}

pub fn new_dpb(sps: &SeqParams) -> Dpb {
    let mut dpb = Dpb::new();
    dpb.activate(sps).unwrap();
    dpb
}

/// 在当前解码序列中放入一个图像并设置标志位
pub fn push_picture(dpb: &mut Dpb, poc: i32, flags: PicFlags) -> PicId {
    let id = dpb.allocate(poc).unwrap();
    dpb.frames[id.0].flags = flags;
    id
}

pub fn push_ref(dpb: &mut Dpb, poc: i32) -> PicId {
    push_picture(dpb, poc, PicFlags::SHORT_REF)
}

/// 所有占用槽位的 (POC, 标志位), 按槽位顺序
pub fn dpb_snapshot(dpb: &Dpb) -> Vec<(i32, PicFlags, u16)> {
    dpb.live_frames()
        .map(|(_, frame)| (frame.poc, frame.flags, frame.sequence))
        .collect()
}

pub fn unit_packet(unit: &AccessUnit, pts: i64) -> Packet {
    Packet::from_data(unit.encode()).with_timestamps(pts, pts)
}

/// 送入全部数据包并排空, 返回输出帧与单元级错误
pub fn decode_all(
    decoder: &mut dyn Decoder,
    packets: &[Packet],
) -> (Vec<VideoFrame>, Vec<ZhenError>) {
    let mut frames = Vec::new();
    let mut errors = Vec::new();
    for packet in packets {
        if let Err(e) = decoder.send_packet(packet) {
            errors.push(e);
        }
        receive_until(decoder, &mut frames, &mut errors, false);
    }
    decoder.send_packet(&Packet::empty()).unwrap();
    receive_until(decoder, &mut frames, &mut errors, true);
    (frames, errors)
}

fn receive_until(
    decoder: &mut dyn Decoder,
    frames: &mut Vec<VideoFrame>,
    errors: &mut Vec<ZhenError>,
    draining: bool,
) {
    loop {
        match decoder.receive_frame() {
            Ok(frame) => frames.push(frame),
            Err(ZhenError::NeedMoreData) => {
                assert!(!draining, "排空阶段不应返回 NeedMoreData");
                return;
            }
            Err(ZhenError::Eof) => return,
            Err(e) => errors.push(e),
        }
    }
}

pub fn decode_single(packets: &[Packet]) -> (Vec<VideoFrame>, Vec<ZhenError>) {
    let mut decoder = HevcDecoder::new();
    decode_all(&mut decoder, packets)
}

pub fn decode_threaded(
    packets: &[Packet],
    thread_count: usize,
) -> (Vec<VideoFrame>, Vec<ZhenError>) {
    let config = FrameThreadConfig {
        thread_count,
        ..Default::default()
    };
    let mut decoder = FrameThreadDecoder::new(&config, |_| Ok(HevcDecoder::new())).unwrap();
    decode_all(&mut decoder, packets)
}

/// 输出帧摘要: (POC, PTS, 校验和)
pub fn summarize(frames: &[VideoFrame]) -> Vec<(i32, i64, u64)> {
    frames
        .iter()
        .map(|frame| (frame.poc, frame.pts, frame.checksum()))
        .collect()
}
