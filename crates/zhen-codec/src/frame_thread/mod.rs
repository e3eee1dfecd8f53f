//! 帧级多线程解码.
//!
//! 压缩单元按提交顺序轮流分配给固定数量的工作线程, 每个工作线程持有一份独立的解码器.
//! 解码器在 setup 阶段 (分配图像、构建参考列表、选择输出帧) 结束时调用
//! [`FrameContext::finish_setup`] 发布自己的状态, 下一个单元在此之后才能开始;
//! 样本重建阶段与后续单元并行, 通过 [`ThreadProgress`] 逐行同步参考数据.
//!
//! 结果严格按提交顺序取出. 初始的 `delay` 个单元只提交不输出.

mod adapter;
mod config;
mod context;
mod handoff;
mod pool;
mod progress;
mod slot;


use std::sync::{Mutex, MutexGuard, PoisonError};

use zhen_core::ZhenResult;

use crate::codec_parameters::StreamParams;
use crate::frame::VideoFrame;
use crate::packet::Packet;

pub use adapter::FrameThreadDecoder;
pub use config::{FrameThreadConfig, MAX_AUTO_THREADS};
pub use context::FrameContext;
pub use handoff::HandoffLane;
pub use pool::FrameThreadPool;
pub use progress::{PROGRESS_DONE, ThreadProgress};
pub use slot::SlotState;

/// 可以放入帧线程池的解码器
pub trait FrameThreadCodec: Send + 'static {
    /// setup 完成时发布、传播给下一个槽位的解码状态
    type State: Clone + Send + 'static;
    /// 串行交接令牌类型, 不需要时用 `()`
    type Token: Send + 'static;

    /// 解码器名称, 用于线程命名与日志
    fn codec_name(&self) -> &str;

    /// 是否需要跨槽位传播解码状态
    ///
    /// 返回 `false` 的解码器在解码前自动完成 setup, 各单元完全并行.
    fn propagates_context(&self) -> bool {
        true
    }

    /// 流结束时是否还有缓存帧需要输出 (空包也要提交给工作线程)
    fn has_delay(&self) -> bool {
        false
    }

    /// 当前解码状态快照
    fn snapshot(&self) -> Self::State;

    /// 用上一个单元发布的状态更新本解码器
    fn update_thread_context(&mut self, src: &Self::State) -> ZhenResult<()>;

    /// 解码一个单元, `Ok(None)` 表示本单元没有输出帧
    fn decode(
        &mut self,
        ctx: &FrameContext<'_, Self::State, Self::Token>,
        packet: &Packet,
    ) -> ZhenResult<Option<VideoFrame>>;

    /// 应用调用方在 `open` 时给出的流参数 (时间基、色彩描述)
    fn open_codec(&mut self, _params: &StreamParams) -> ZhenResult<()> {
        Ok(())
    }

    /// 回传给调用方的流参数
    fn stream_params(&self) -> StreamParams {
        StreamParams::default()
    }

    /// 清空解码器内部状态
    fn flush_codec(&mut self);
}

/// 加锁, 持锁线程 panic 后继续使用内部数据
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
