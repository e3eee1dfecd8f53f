//! 码流生成与解码驱动.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use zhen_codec::decoders::hevc::{HevcDecoder, StreamConfig, synthesize};
use zhen_codec::frame_thread::{FrameThreadConfig, FrameThreadDecoder};
use zhen_codec::{Decoder, Packet, StreamParams, VideoFrame};
use zhen_core::{Rational, Timestamp, ZhenError};

/// 一次解码的统计
#[derive(Debug, Default)]
pub struct DecodeReport {
    pub label: String,
    /// (PTS, POC, 校验和)
    pub frames: Vec<(i64, i32, u64)>,
    pub unit_errors: usize,
    /// PTS 未严格递增的输出帧数
    pub order_violations: usize,
    pub elapsed: Duration,
}

impl DecodeReport {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    fn record(&mut self, frame: &VideoFrame, verbose: bool) {
        let checksum = frame.checksum();
        let in_order = self.frames.last().is_none_or(|&(pts, _, _)| frame.pts > pts);
        if !in_order {
            self.order_violations += 1;
            warn!("输出乱序: pts={} 在 {:?} 之后", frame.pts, self.frames.last());
        }
        if verbose {
            println!(
                "frame {:5} pts={:5} t={} poc={:4} type={:?} dts={:5} checksum={:016x}{}",
                self.frames.len(),
                frame.pts,
                Timestamp::new(frame.pts, frame.time_base),
                frame.poc,
                frame.picture_type,
                frame.pkt_dts,
                checksum,
                if in_order { "" } else { " (乱序)" },
            );
        }
        self.frames.push((frame.pts, frame.poc, checksum));
    }

    pub fn print_summary(&self) {
        let secs = self.elapsed.as_secs_f64();
        let fps = if secs > 0.0 {
            self.frames.len() as f64 / secs
        } else {
            0.0
        };
        println!(
            "[{}] 输出 {} 帧, 单元错误 {}, 乱序 {}, 耗时 {:.3}s ({:.1} fps)",
            self.label,
            self.frames.len(),
            self.unit_errors,
            self.order_violations,
            secs,
            fps,
        );
    }
}

/// 生成合成码流
pub fn build_stream(config: &StreamConfig) -> Result<Vec<Packet>> {
    let packets = synthesize(config).context("生成合成码流失败")?;
    info!(
        "合成码流: {}x{}, {} bit, {} 个 GOP, 共 {} 个数据包",
        config.width,
        config.height,
        config.bit_depth,
        config.gop_count,
        packets.len()
    );
    Ok(packets)
}

/// 单线程解码
pub fn decode_single(packets: &[Packet], fps: u32, verbose: bool) -> Result<DecodeReport> {
    let mut decoder = HevcDecoder::new();
    run_decoder(&mut decoder, packets, fps, DecodeReport::new("single"), verbose)
}

/// 帧线程解码
pub fn decode_threaded(
    packets: &[Packet],
    config: &FrameThreadConfig,
    fps: u32,
    verbose: bool,
) -> Result<DecodeReport> {
    let mut decoder = FrameThreadDecoder::new(config, |_| Ok(HevcDecoder::new()))
        .context("创建帧线程解码器失败")?;
    let label = format!("threads={}", config.resolved_thread_count());
    run_decoder(&mut decoder, packets, fps, DecodeReport::new(label), verbose)
}

/// 单线程与帧线程输出逐帧比较
pub fn compare(packets: &[Packet], config: &FrameThreadConfig, fps: u32) -> Result<()> {
    let single = decode_single(packets, fps, false)?;
    let threaded = decode_threaded(packets, config, fps, false)?;
    single.print_summary();
    threaded.print_summary();
    if single.frames.len() != threaded.frames.len() {
        anyhow::bail!(
            "输出帧数不一致: single={}, threaded={}",
            single.frames.len(),
            threaded.frames.len()
        );
    }
    if let Some((index, (a, b))) = single
        .frames
        .iter()
        .zip(&threaded.frames)
        .enumerate()
        .find(|(_, (a, b))| a != b)
    {
        anyhow::bail!("第 {index} 帧不一致: single={a:?}, threaded={b:?}");
    }
    println!("单线程与帧线程输出一致 ({} 帧)", single.frames.len());
    Ok(())
}

fn run_decoder(
    decoder: &mut dyn Decoder,
    packets: &[Packet],
    fps: u32,
    mut report: DecodeReport,
    verbose: bool,
) -> Result<DecodeReport> {
    let fps = i32::try_from(fps).context("帧率超出范围")?;
    let params = StreamParams {
        time_base: Rational::new(1, fps),
        ..Default::default()
    };
    decoder
        .open(&params)
        .with_context(|| format!("打开解码器 {} 失败", decoder.name()))?;

    let start = Instant::now();
    for packet in packets {
        if let Err(e) = decoder.send_packet(packet) {
            report.unit_errors += 1;
            warn!("送入数据包失败: dts={}, {}", packet.dts, e);
        }
        receive_all(decoder, &mut report, verbose);
    }
    if let Err(e) = decoder.send_packet(&Packet::empty()) {
        warn!("送入结束标记失败: {}", e);
    }
    receive_all(decoder, &mut report, verbose);
    report.elapsed = start.elapsed();
    debug!("{} 解码完成, 耗时 {:?}", report.label, report.elapsed);
    Ok(report)
}

fn receive_all(decoder: &mut dyn Decoder, report: &mut DecodeReport, verbose: bool) {
    loop {
        match decoder.receive_frame() {
            Ok(frame) => report.record(&frame, verbose),
            Err(ZhenError::NeedMoreData) | Err(ZhenError::Eof) => return,
            Err(e) => {
                report.unit_errors += 1;
                warn!("解码单元失败: {}", e);
            }
        }
    }
}
