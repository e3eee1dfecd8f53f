//! # zhen-codec
//!
//! zhen 帧级解码框架的编解码核心, 提供 Packet/Frame 抽象、帧线程调度器与 HEVC 参考帧管理.
//!
//! - [`frame_thread`]: 把压缩帧分发到固定数量的工作线程, 按提交顺序取出结果,
//!   线程之间通过逐帧进度计数器同步参考帧数据.
//! - [`decoders::hevc`]: HEVC 解码图像缓冲区 (DPB) 管理, 包括参考帧标记、
//!   参考列表构建、显示重排 (bumping) 与缺失参考帧合成.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use zhen_codec::decoders::hevc::HevcDecoder;
//! use zhen_codec::frame_thread::{FrameThreadConfig, FrameThreadDecoder};
//! use zhen_codec::{Decoder, Packet};
//!
//! let config = FrameThreadConfig {
//!     thread_count: 4,
//!     ..Default::default()
//! };
//! let mut decoder = FrameThreadDecoder::new(&config, |_| Ok(HevcDecoder::new())).unwrap();
//! decoder.send_packet(&Packet::empty()).unwrap();
//! while let Ok(frame) = decoder.receive_frame() {
//!     println!("{}x{}", frame.width, frame.height);
//! }
//! ```

pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod frame_thread;
pub mod packet;

// 重导出常用类型
pub use codec_parameters::StreamParams;
pub use decoder::Decoder;
pub use frame::{PictureType, VideoFrame};
pub use packet::Packet;
