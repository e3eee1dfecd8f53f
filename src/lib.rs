//! # Zhen (帧)
//!
//! 纯 Rust 实现的帧级并行解码框架, 对标 FFmpeg 的帧线程与 HEVC 参考帧管理.
//!
//! - **帧线程调度**: 固定数量的工作线程按提交顺序解码、按提交顺序输出,
//!   线程之间通过逐帧进度计数器等待参考数据
//! - **HEVC DPB 管理**: 参考帧标记、参考列表构建、显示重排与缺失参考帧合成
//! - **日志**: console + 按天滚动的文件输出
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use zhen::codec::decoders::hevc::{HevcDecoder, StreamConfig, synthesize};
//! use zhen::codec::frame_thread::{FrameThreadConfig, FrameThreadDecoder};
//! use zhen::codec::{Decoder, Packet};
//!
//! let packets = synthesize(&StreamConfig::default()).unwrap();
//! let config = FrameThreadConfig { thread_count: 4, ..Default::default() };
//! let mut decoder = FrameThreadDecoder::new(&config, |_| Ok(HevcDecoder::new())).unwrap();
//! for packet in &packets {
//!     decoder.send_packet(packet).unwrap();
//!     while let Ok(frame) = decoder.receive_frame() {
//!         println!("pts={} checksum={:016x}", frame.pts, frame.checksum());
//!     }
//! }
//! decoder.send_packet(&Packet::empty()).unwrap();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `zhen-core` | 核心类型与错误定义 |
//! | `zhen-codec` | 帧线程调度器与 HEVC DPB |

pub mod logging;

/// 核心类型与工具 (对标 libavutil)
pub use zhen_core as core;

/// 编解码框架 (对标 libavcodec)
pub use zhen_codec as codec;

/// 获取 Zhen 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
