//! 逐帧解码进度.
//!
//! 每个图像携带两个单调递增的进度计数器 (帧 / 顶场用 0, 底场用 1).
//! 解码线程每完成一段行就上报一次, 引用该图像的线程在读取前等待计数器达到所需行号.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Condvar, Mutex};

use log::debug;

use super::lock;

/// 进度完成标记, 等待该值表示等待整帧解码结束
pub const PROGRESS_DONE: i32 = i32::MAX;

/// 进度计数器
#[derive(Debug)]
pub struct ThreadProgress {
    progress: [AtomicI32; 2],
    mutex: Mutex<()>,
    cond: Condvar,
    debug: bool,
}

impl ThreadProgress {
    /// 创建未开始的进度 (两个计数器都为 -1)
    pub fn new(debug: bool) -> Self {
        Self {
            progress: [AtomicI32::new(-1), AtomicI32::new(-1)],
            mutex: Mutex::new(()),
            cond: Condvar::new(),
            debug,
        }
    }

    /// 创建已完成的进度, 用于合成的占位参考帧
    pub fn completed() -> Self {
        Self {
            progress: [AtomicI32::new(PROGRESS_DONE), AtomicI32::new(PROGRESS_DONE)],
            mutex: Mutex::new(()),
            cond: Condvar::new(),
            debug: false,
        }
    }

    /// 当前进度
    pub fn get(&self, field: usize) -> i32 {
        self.progress[field].load(Ordering::Acquire)
    }

    /// 上报进度: 计数器推进到 `n` 并唤醒等待者
    ///
    /// 计数器只增不减, 小于等于当前值的上报被忽略.
    pub fn report(&self, n: i32, field: usize) {
        let entry = &self.progress[field];
        if entry.load(Ordering::Acquire) >= n {
            return;
        }
        if self.debug {
            debug!("上报进度 {} (field {})", n, field);
        }
        let _guard = lock(&self.mutex);
        entry.store(n, Ordering::Release);
        self.cond.notify_all();
    }

    /// 阻塞直到计数器 >= `n`
    pub fn wait(&self, n: i32, field: usize) {
        let entry = &self.progress[field];
        if entry.load(Ordering::Acquire) >= n {
            return;
        }
        if self.debug {
            debug!("等待进度 {} (field {})", n, field);
        }
        let mut guard = lock(&self.mutex);
        while entry.load(Ordering::Acquire) < n {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// 是否已解码完成
    pub fn is_done(&self) -> bool {
        self.get(0) == PROGRESS_DONE
    }
}
