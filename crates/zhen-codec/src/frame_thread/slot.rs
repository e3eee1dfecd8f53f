//! 工作槽位与工作线程主循环.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use log::{debug, error};
use zhen_core::{ZhenError, ZhenResult};

use super::context::FrameContext;
use super::handoff::HandoffLane;
use super::{FrameThreadCodec, lock};
use crate::codec_parameters::StreamParams;
use crate::frame::VideoFrame;
use crate::packet::Packet;

/// 槽位生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// 空闲, 等待输入
    InputReady,
    /// 已提交, 解码器正在做 setup (分配图像、构建参考列表)
    SettingUp,
    /// setup 完成, 后续单元可以开始
    SetupFinished,
}

struct StatusInner<S> {
    state: SlotState,
    /// setup 完成时发布的解码状态, 供下一个槽位传播
    published: Option<S>,
}

/// 槽位状态机, 主线程与工作线程在同一个条件变量上等待状态变化
pub(crate) struct SlotStatus<S> {
    inner: Mutex<StatusInner<S>>,
    cond: Condvar,
}

impl<S: Clone> SlotStatus<S> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                state: SlotState::InputReady,
                published: None,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> SlotState {
        lock(&self.inner).state
    }

    fn begin_setup(&self) {
        let mut inner = lock(&self.inner);
        inner.state = SlotState::SettingUp;
        inner.published = None;
    }

    pub(crate) fn publish(&self, state: S) {
        let mut inner = lock(&self.inner);
        inner.published = Some(state);
        inner.state = SlotState::SetupFinished;
        self.cond.notify_all();
    }

    /// 已发布过状态时用新快照替换, 下一个槽位传播到的是更新后的状态
    fn refresh_published(&self, state: S) {
        let mut inner = lock(&self.inner);
        if inner.published.is_some() {
            inner.published = Some(state);
        }
    }

    fn finish_decode(&self) {
        let mut inner = lock(&self.inner);
        inner.state = SlotState::InputReady;
        self.cond.notify_all();
    }

    /// 等待离开 SettingUp, 返回发布的状态
    fn wait_setup_done(&self) -> Option<S> {
        let mut inner = lock(&self.inner);
        while inner.state == SlotState::SettingUp {
            inner = self
                .cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner.published.clone()
    }

    fn wait_idle(&self) {
        let mut inner = lock(&self.inner);
        while inner.state != SlotState::InputReady {
            inner = self
                .cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

pub(crate) struct Job<C: FrameThreadCodec> {
    /// 解码期间由工作线程取走
    codec: Option<C>,
    packet: Option<Packet>,
    ticket: u64,
    result: Option<ZhenResult<Option<VideoFrame>>>,
    params: StreamParams,
    die: bool,
}

/// 一个工作槽位: 一个解码器实例、至多一个在途单元
pub(crate) struct Slot<C: FrameThreadCodec> {
    pub(crate) index: usize,
    job: Mutex<Job<C>>,
    job_cond: Condvar,
    pub(crate) status: SlotStatus<C::State>,
}

impl<C: FrameThreadCodec> Slot<C> {
    pub(crate) fn new(index: usize, codec: C) -> Self {
        let params = codec.stream_params();
        Self {
            index,
            job: Mutex::new(Job {
                codec: Some(codec),
                packet: None,
                ticket: 0,
                result: None,
                params,
                die: false,
            }),
            job_cond: Condvar::new(),
            status: SlotStatus::new(),
        }
    }

    /// 把单元交给工作线程, 槽位进入 SettingUp
    pub(crate) fn start(&self, packet: Packet, ticket: u64) {
        self.status.begin_setup();
        let mut job = lock(&self.job);
        job.packet = Some(packet);
        job.ticket = ticket;
        job.result = None;
        self.job_cond.notify_one();
    }

    pub(crate) fn wait_setup_done(&self) -> Option<C::State> {
        self.status.wait_setup_done()
    }

    pub(crate) fn wait_idle(&self) {
        self.status.wait_idle();
    }

    /// 取出结果与流参数, 调用前槽位必须空闲
    pub(crate) fn take_result(&self) -> (Option<ZhenResult<Option<VideoFrame>>>, StreamParams) {
        let mut job = lock(&self.job);
        (job.result.take(), job.params.clone())
    }

    /// 在空闲槽位的解码器上执行操作
    pub(crate) fn with_codec<R>(&self, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        let mut job = lock(&self.job);
        job.codec.as_mut().map(f)
    }

    /// 在空闲槽位的解码器上应用流参数, 并刷新回传的参数
    pub(crate) fn open(&self, params: &StreamParams) -> ZhenResult<StreamParams> {
        let mut job = lock(&self.job);
        let codec = job
            .codec
            .as_mut()
            .ok_or_else(|| ZhenError::Internal("槽位缺少解码器".into()))?;
        codec.open_codec(params)?;
        self.status.refresh_published(codec.snapshot());
        let refreshed = codec.stream_params();
        job.params = refreshed.clone();
        Ok(refreshed)
    }

    pub(crate) fn clear(&self) {
        let mut job = lock(&self.job);
        job.result = None;
        job.packet = None;
    }

    pub(crate) fn stop(&self) {
        let mut job = lock(&self.job);
        job.die = true;
        self.job_cond.notify_one();
    }
}

/// 工作线程主循环
pub(crate) fn run_worker<C: FrameThreadCodec>(
    slot: Arc<Slot<C>>,
    lane: Arc<HandoffLane<C::Token>>,
    debug_threads: bool,
) {
    loop {
        let (codec, packet, ticket) = {
            let mut job = lock(&slot.job);
            let packet = loop {
                if job.die {
                    return;
                }
                if let Some(packet) = job.packet.take() {
                    break packet;
                }
                job = slot
                    .job_cond
                    .wait(job)
                    .unwrap_or_else(PoisonError::into_inner);
            };
            (job.codec.take(), packet, job.ticket)
        };

        let Some(mut codec) = codec else {
            error!("工作线程 {}: 槽位缺少解码器", slot.index);
            lock(&slot.job).result = Some(Err(ZhenError::Internal("槽位缺少解码器".into())));
            slot.status.finish_decode();
            continue;
        };

        let ctx = FrameContext::threaded(
            &slot.status,
            &lane,
            ticket,
            codec.propagates_context(),
            debug_threads,
            slot.index,
        );
        if !codec.propagates_context() {
            ctx.finish_setup(codec.snapshot());
        }

        // 解码器 panic 只让当前单元失败, 槽位照常回到空闲
        let result = panic::catch_unwind(AssertUnwindSafe(|| codec.decode(&ctx, &packet)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!("工作线程 {}: 单元 {} 解码器 panic: {}", slot.index, ticket, message);
                Err(ZhenError::Internal(format!("解码器 panic: {message}")))
            })
            .map(|frame| {
                frame.map(|mut frame| {
                    frame.pkt_dts = packet.dts;
                    frame
                })
            });

        if !ctx.is_setup_finished() {
            ctx.finish_setup(codec.snapshot());
        }
        ctx.release_token();

        if let Err(err) = &result {
            debug!("工作线程 {}: 单元 {} 解码失败: {}", slot.index, ticket, err);
        }

        {
            let mut job = lock(&slot.job);
            job.params = codec.stream_params();
            job.codec = Some(codec);
            job.result = Some(result);
        }
        slot.status.finish_decode();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}
