//! 帧线程池.
//!
//! 固定数量的工作槽位按轮转顺序接收单元. `next_submit` 与 `next_drain` 两个游标
//! 都对槽位数取模单调推进, 因此先提交的单元一定先被取出, 即使后面的单元先解码完成.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use zhen_core::{ZhenError, ZhenResult};

use super::config::FrameThreadConfig;
use super::handoff::HandoffLane;
use super::slot::{Slot, SlotState, run_worker};
use super::FrameThreadCodec;
use crate::codec_parameters::StreamParams;
use crate::frame::VideoFrame;
use crate::packet::Packet;

/// 帧线程池
pub struct FrameThreadPool<C: FrameThreadCodec> {
    slots: Vec<Arc<Slot<C>>>,
    workers: Vec<JoinHandle<()>>,
    lane: Arc<HandoffLane<C::Token>>,
    /// 已提交但尚未取出结果的槽位
    pending: Vec<bool>,
    next_submit: usize,
    next_drain: usize,
    /// 最近一次提交所在的槽位
    prev: Option<usize>,
    delaying: bool,
    delay: usize,
    /// 启动或 flush 以来提交的单元数
    submitted: usize,
    next_ticket: u64,
    params: StreamParams,
    codec_name: String,
    propagates: bool,
    has_delay: bool,
}

impl<C: FrameThreadCodec> FrameThreadPool<C> {
    /// 创建线程池, `factory` 为每个槽位创建一个解码器实例
    pub fn new<F>(config: &FrameThreadConfig, factory: F) -> ZhenResult<Self>
    where
        F: FnMut(usize) -> ZhenResult<C>,
    {
        Self::build(config, None, factory)
    }

    /// 创建带串行交接令牌的线程池
    pub fn with_handoff<F>(config: &FrameThreadConfig, token: C::Token, factory: F) -> ZhenResult<Self>
    where
        F: FnMut(usize) -> ZhenResult<C>,
    {
        Self::build(config, Some(token), factory)
    }

    fn build<F>(config: &FrameThreadConfig, token: Option<C::Token>, mut factory: F) -> ZhenResult<Self>
    where
        F: FnMut(usize) -> ZhenResult<C>,
    {
        let thread_count = config.resolved_thread_count();
        let delay = config.resolved_delay(thread_count);
        let mut pool = Self {
            slots: Vec::with_capacity(thread_count),
            workers: Vec::with_capacity(thread_count),
            lane: Arc::new(HandoffLane::new(token)),
            pending: Vec::with_capacity(thread_count),
            next_submit: 0,
            next_drain: 0,
            prev: None,
            delaying: true,
            delay,
            submitted: 0,
            next_ticket: 0,
            params: StreamParams::default(),
            codec_name: String::new(),
            propagates: true,
            has_delay: false,
        };

        // 出错时提前返回, 已启动的线程由 Drop 回收
        for index in 0..thread_count {
            let codec = factory(index).map_err(|e| {
                error!("初始化第 {} 个解码上下文失败: {}", index, e);
                ZhenError::ThreadSetup(format!("初始化第 {} 个解码上下文失败: {}", index, e))
            })?;
            if index == 0 {
                pool.codec_name = codec.codec_name().to_string();
                pool.propagates = codec.propagates_context();
                pool.has_delay = codec.has_delay();
                pool.params = codec.stream_params();
            }

            let slot = Arc::new(Slot::new(index, codec));
            let handle = {
                let slot = Arc::clone(&slot);
                let lane = Arc::clone(&pool.lane);
                let debug_threads = config.debug_threads;
                thread::Builder::new()
                    .name(format!("zhen:{}:df{}", pool.codec_name, index))
                    .spawn(move || run_worker(slot, lane, debug_threads))
                    .map_err(|e| {
                        error!("创建工作线程 {} 失败: {}", index, e);
                        ZhenError::ThreadSetup(format!("创建工作线程 {} 失败: {}", index, e))
                    })?
            };
            pool.slots.push(slot);
            pool.workers.push(handle);
            pool.pending.push(false);
        }

        debug!(
            "帧线程池启动: codec={}, 线程数={}, 延迟={}",
            pool.codec_name, thread_count, delay
        );
        Ok(pool)
    }

    /// 把一个单元提交到 `next_submit` 槽位
    ///
    /// 等待上一个单元 setup 完成后, 把它发布的解码状态传播给目标槽位的解码器.
    /// 目标槽位的上一个结果还没被取出时返回 `PipelineFull`.
    /// 不支持延迟输出的解码器收到空包时什么也不做.
    pub fn submit(&mut self, packet: &Packet) -> ZhenResult<()> {
        if packet.is_empty() && !self.has_delay {
            return Ok(());
        }
        let index = self.next_submit;
        if self.pending[index] {
            return Err(ZhenError::PipelineFull);
        }
        let slot = Arc::clone(&self.slots[index]);
        slot.wait_idle();

        if let Some(prev) = self.prev.filter(|&prev| prev != index && self.propagates) {
            if let Some(state) = self.slots[prev].wait_setup_done() {
                slot.with_codec(|codec| codec.update_thread_context(&state))
                    .unwrap_or_else(|| Err(ZhenError::Internal("槽位缺少解码器".into())))
                    .map_err(|e| {
                        ZhenError::Propagation(format!("槽位 {} -> {}: {}", prev, index, e))
                    })?;
            }
        }

        slot.start(packet.clone(), self.next_ticket);
        self.next_ticket += 1;
        self.pending[index] = true;
        self.prev = Some(index);
        self.next_submit = (index + 1) % self.slots.len();
        self.submitted += 1;
        if self.submitted > self.delay {
            self.delaying = false;
        }
        Ok(())
    }

    /// 取出 `next_drain` 槽位的结果
    ///
    /// 初始延迟期间或该槽位没有在途单元时返回 `Ok(None)`.
    pub fn drain(&mut self) -> ZhenResult<Option<VideoFrame>> {
        if self.delaying {
            return Ok(None);
        }
        self.drain_next()
    }

    /// 提交并取出一个结果
    ///
    /// 非空包: 延迟期间只提交, 之后每次取出最早的单元的结果.
    /// 空包 (流结束): 按取出顺序遍历槽位, 跳过既没有帧也没有出错的槽位,
    /// 直到找到结果或遍历一圈. 返回 `Ok(None)` 表示所有缓存帧已输出.
    pub fn decode(&mut self, packet: &Packet) -> ZhenResult<Option<VideoFrame>> {
        self.submit(packet)?;

        if !packet.is_empty() {
            if self.delaying {
                return Ok(None);
            }
            return self.drain_next();
        }

        let start = self.next_drain;
        let mut index = start;
        loop {
            let result = if self.pending[index] {
                self.collect(index)
            } else {
                Ok(None)
            };
            index = (index + 1) % self.slots.len();
            if !matches!(result, Ok(None)) || index == start {
                self.next_drain = index;
                return result;
            }
        }
    }

    /// 把调用方的流参数交给每个槽位的解码器
    ///
    /// 先等待所有在途单元完成 setup 与解码, 在途结果保留.
    pub fn open(&mut self, params: &StreamParams) -> ZhenResult<()> {
        self.park();
        for slot in &self.slots {
            let refreshed = slot.open(params)?;
            if slot.index == 0 {
                self.params = refreshed;
            }
        }
        debug!("帧线程池已打开: codec={}", self.codec_name);
        Ok(())
    }

    /// 停下所有工作线程并重置调度状态 (用于 seek)
    ///
    /// 最后提交的槽位的状态传回槽位 0, 之后从槽位 0 重新开始并重新进入延迟期.
    pub fn flush(&mut self) {
        self.park();

        if let Some(prev) = self.prev.filter(|&prev| prev != 0 && self.propagates) {
            let state = self.slots[prev].with_codec(|codec| codec.snapshot());
            if let Some(state) = state {
                let result = self.slots[0].with_codec(|codec| codec.update_thread_context(&state));
                if let Some(Err(e)) = result {
                    warn!("flush: 槽位 {} -> 0 状态传播失败: {}", prev, e);
                }
            }
        }

        for (slot, pending) in self.slots.iter().zip(self.pending.iter_mut()) {
            slot.clear();
            slot.with_codec(|codec| codec.flush_codec());
            *pending = false;
        }
        self.next_submit = 0;
        self.next_drain = 0;
        self.prev = None;
        self.delaying = true;
        self.submitted = 0;
        debug!("帧线程池已 flush: codec={}", self.codec_name);
    }

    /// 用户可见的流参数, 每次取出结果后刷新
    pub fn stream_params(&self) -> &StreamParams {
        &self.params
    }

    /// 解码器名称
    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// 工作线程数
    pub fn thread_count(&self) -> usize {
        self.slots.len()
    }

    /// 初始延迟
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// 是否仍处于初始延迟期
    pub fn is_delaying(&self) -> bool {
        self.delaying
    }

    /// 已提交但尚未取出的单元数
    pub fn in_flight(&self) -> usize {
        self.pending.iter().filter(|&&pending| pending).count()
    }

    /// 槽位当前状态
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(|slot| slot.status.state())
    }

    fn drain_next(&mut self) -> ZhenResult<Option<VideoFrame>> {
        let index = self.next_drain;
        if !self.pending[index] {
            return Ok(None);
        }
        let result = self.collect(index);
        self.next_drain = (index + 1) % self.slots.len();
        result
    }

    /// 等待槽位空闲并取出结果
    fn collect(&mut self, index: usize) -> ZhenResult<Option<VideoFrame>> {
        let slot = &self.slots[index];
        slot.wait_idle();
        let (result, params) = slot.take_result();
        self.params = params;
        self.pending[index] = false;
        result.unwrap_or(Ok(None))
    }

    /// 等待所有槽位回到空闲
    fn park(&self) {
        for slot in &self.slots {
            slot.wait_idle();
        }
    }
}

impl<C: FrameThreadCodec> Drop for FrameThreadPool<C> {
    fn drop(&mut self) {
        self.park();
        for slot in &self.slots {
            slot.stop();
        }
        for (index, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                error!("工作线程 {} 异常退出", index);
            }
        }
    }
}
