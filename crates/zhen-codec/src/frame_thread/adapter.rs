//! 帧线程解码器适配: 把 `FrameThreadPool` 包装成普通的 `Decoder`.

use std::collections::VecDeque;

use zhen_core::{ZhenError, ZhenResult};

use super::config::FrameThreadConfig;
use super::pool::FrameThreadPool;
use super::FrameThreadCodec;
use crate::codec_parameters::StreamParams;
use crate::decoder::Decoder;
use crate::frame::VideoFrame;
use crate::packet::Packet;

/// 帧线程解码器
pub struct FrameThreadDecoder<C: FrameThreadCodec> {
    pool: FrameThreadPool<C>,
    /// 已取出但还没交给调用方的结果
    ready: VecDeque<ZhenResult<VideoFrame>>,
    draining: bool,
    finished: bool,
}

impl<C: FrameThreadCodec> FrameThreadDecoder<C> {
    /// 创建帧线程解码器
    pub fn new<F>(config: &FrameThreadConfig, factory: F) -> ZhenResult<Self>
    where
        F: FnMut(usize) -> ZhenResult<C>,
    {
        Ok(Self::from_pool(FrameThreadPool::new(config, factory)?))
    }

    /// 包装已有的线程池
    pub fn from_pool(pool: FrameThreadPool<C>) -> Self {
        Self {
            pool,
            ready: VecDeque::new(),
            draining: false,
            finished: false,
        }
    }

    /// 内部线程池
    pub fn pool(&self) -> &FrameThreadPool<C> {
        &self.pool
    }

    fn push(&mut self, result: ZhenResult<Option<VideoFrame>>) {
        match result {
            Ok(Some(frame)) => self.ready.push_back(Ok(frame)),
            Ok(None) => {}
            Err(e) => self.ready.push_back(Err(e)),
        }
    }
}

impl<C: FrameThreadCodec> Decoder for FrameThreadDecoder<C> {
    fn name(&self) -> &str {
        self.pool.codec_name()
    }

    fn open(&mut self, params: &StreamParams) -> ZhenResult<()> {
        self.pool.open(params)
    }

    fn send_packet(&mut self, packet: &Packet) -> ZhenResult<()> {
        if packet.is_empty() {
            self.draining = true;
            return Ok(());
        }
        if self.draining {
            return Err(ZhenError::InvalidArgument(
                "流结束后不能再送入数据, 需要先 flush".into(),
            ));
        }
        // 提交失败说明数据包未被接受, 直接返回; 取出的单元级错误排队交给 receive_frame
        self.pool.submit(packet)?;
        let result = self.pool.drain();
        self.push(result);
        Ok(())
    }

    fn receive_frame(&mut self) -> ZhenResult<VideoFrame> {
        if let Some(result) = self.ready.pop_front() {
            return result;
        }
        if !self.draining {
            return Err(ZhenError::NeedMoreData);
        }
        if self.finished {
            return Err(ZhenError::Eof);
        }
        match self.pool.decode(&Packet::empty()) {
            Ok(Some(frame)) => {
                self.push(Ok(Some(frame)));
                self.ready.pop_front().unwrap_or(Err(ZhenError::Eof))
            }
            Ok(None) => {
                self.finished = true;
                Err(ZhenError::Eof)
            }
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) {
        self.pool.flush();
        self.ready.clear();
        self.draining = false;
        self.finished = false;
    }
}
