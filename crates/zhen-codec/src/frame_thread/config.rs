//! 帧线程配置.

use serde::{Deserialize, Serialize};

/// 自动选择线程数时的上限
pub const MAX_AUTO_THREADS: usize = 16;

/// 帧线程配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameThreadConfig {
    /// 工作线程数, 0 表示按 CPU 数自动选择 (`min(cpus + 1, 16)`)
    pub thread_count: usize,
    /// 开始输出前积累的单元数, 默认 `thread_count - 1`
    pub delay: Option<usize>,
    /// 输出进度上报/等待的调试日志
    pub debug_threads: bool,
}

impl Default for FrameThreadConfig {
    fn default() -> Self {
        Self {
            thread_count: 0,
            delay: None,
            debug_threads: false,
        }
    }
}

impl FrameThreadConfig {
    /// 实际使用的线程数
    pub fn resolved_thread_count(&self) -> usize {
        if self.thread_count > 0 {
            return self.thread_count;
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if cpus > 1 {
            (cpus + 1).min(MAX_AUTO_THREADS)
        } else {
            1
        }
    }

    /// 实际使用的初始延迟, 不超过 `thread_count - 1`
    pub fn resolved_delay(&self, thread_count: usize) -> usize {
        let max = thread_count.saturating_sub(1);
        self.delay.unwrap_or(max).min(max)
    }
}
