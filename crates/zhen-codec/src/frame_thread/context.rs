//! 解码器在一个单元内看到的帧线程上下文.

use std::cell::{Cell, RefCell};

use log::{error, warn};
use zhen_core::{ZhenError, ZhenResult};

use super::handoff::HandoffLane;
use super::slot::SlotStatus;

struct WorkerLink<'a, S, T> {
    status: &'a SlotStatus<S>,
    lane: &'a HandoffLane<T>,
    ticket: u64,
    slot_index: usize,
}

/// 帧线程上下文
///
/// 解码器通过它宣布 setup 完成 (`finish_setup`)、查询是否还能分配帧缓冲、
/// 使用串行交接令牌. 单线程解码时使用 [`FrameContext::unthreaded`].
pub struct FrameContext<'a, S, T> {
    link: Option<WorkerLink<'a, S, T>>,
    propagates: bool,
    debug_threads: bool,
    setup_done: Cell<bool>,
    token: RefCell<Option<T>>,
}

impl<'a, S: Clone, T> FrameContext<'a, S, T> {
    /// 单线程解码用的上下文: `finish_setup` 只记录状态
    pub fn unthreaded() -> Self {
        Self {
            link: None,
            propagates: true,
            debug_threads: false,
            setup_done: Cell::new(false),
            token: RefCell::new(None),
        }
    }

    pub(crate) fn threaded(
        status: &'a SlotStatus<S>,
        lane: &'a HandoffLane<T>,
        ticket: u64,
        propagates: bool,
        debug_threads: bool,
        slot_index: usize,
    ) -> Self {
        Self {
            link: Some(WorkerLink {
                status,
                lane,
                ticket,
                slot_index,
            }),
            propagates,
            debug_threads,
            setup_done: Cell::new(false),
            token: RefCell::new(None),
        }
    }

    /// 是否运行在帧线程池中
    pub fn is_threaded(&self) -> bool {
        self.link.is_some()
    }

    /// 所在槽位编号
    pub fn slot_index(&self) -> Option<usize> {
        self.link.as_ref().map(|link| link.slot_index)
    }

    /// 是否输出线程调试日志
    pub fn debug_threads(&self) -> bool {
        self.debug_threads
    }

    /// 宣布 setup 完成并发布解码状态
    ///
    /// 之后下一个槽位才能开始它的单元. 交接通道启用时, 在这里按提交顺序取得令牌.
    /// 同一单元内重复调用只记录警告.
    pub fn finish_setup(&self, state: S) {
        if self.setup_done.replace(true) {
            warn!("同一单元内多次调用 finish_setup");
            return;
        }
        if let Some(link) = &self.link {
            *self.token.borrow_mut() = link.lane.acquire(link.ticket);
            link.status.publish(state);
        }
    }

    /// setup 是否已完成
    pub fn is_setup_finished(&self) -> bool {
        self.setup_done.get()
    }

    /// 是否仍允许开始新帧 (分配帧缓冲)
    pub fn can_start_frame(&self) -> bool {
        !(self.link.is_some() && self.propagates && self.setup_done.get())
    }

    /// 分配帧缓冲前的检查, setup 完成后分配视为错误
    pub fn check_get_buffer(&self) -> ZhenResult<()> {
        if self.can_start_frame() {
            return Ok(());
        }
        error!("finish_setup 之后不能再分配帧缓冲");
        Err(ZhenError::Internal(
            "finish_setup 之后不能再分配帧缓冲".into(),
        ))
    }

    /// 使用交接令牌, 未持有令牌时返回 `None`
    pub fn with_token<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.token.borrow_mut().as_mut().map(f)
    }

    pub(crate) fn release_token(&self) {
        if let Some(link) = &self.link {
            link.lane.release(link.ticket, self.token.borrow_mut().take());
        }
    }
}
