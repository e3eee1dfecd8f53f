//! 串行交接令牌.
//!
//! 某些资源 (例如硬件加速上下文) 同一时刻只能由一个工作线程持有.
//! `HandoffLane` 按提交顺序把令牌依次交给各个单元: 单元 `t` 在 setup 完成时取得令牌,
//! 解码返回时交还, 之后单元 `t + 1` 才能取得. 未提供初始令牌时通道停用, 不做任何串行化.

use std::sync::{Condvar, Mutex, PoisonError};

use super::lock;

struct LaneState<T> {
    token: Option<T>,
    /// 当前允许取令牌的提交序号
    turn: u64,
}

/// 按提交顺序传递的独占令牌
pub struct HandoffLane<T> {
    state: Mutex<LaneState<T>>,
    cond: Condvar,
    enabled: bool,
}

impl<T> HandoffLane<T> {
    /// 创建交接通道, `token` 为 `None` 时通道停用
    pub fn new(token: Option<T>) -> Self {
        Self {
            enabled: token.is_some(),
            state: Mutex::new(LaneState { token, turn: 0 }),
            cond: Condvar::new(),
        }
    }

    /// 通道是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 轮到 `ticket` 时取出令牌 (阻塞)
    ///
    /// 停用的通道立即返回 `None`.
    pub fn acquire(&self, ticket: u64) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let mut state = lock(&self.state);
        while state.turn != ticket {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.token.take()
    }

    /// 交还令牌, 轮次推进到 `ticket + 1`
    pub fn release(&self, ticket: u64, token: Option<T>) {
        if !self.enabled {
            return;
        }
        let mut state = lock(&self.state);
        if token.is_some() {
            state.token = token;
        }
        state.turn = ticket + 1;
        self.cond.notify_all();
    }

    /// 当前轮次
    pub fn turn(&self) -> u64 {
        lock(&self.state).turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_disabled_lane_does_not_block() {
        let lane: HandoffLane<u32> = HandoffLane::new(None);
        assert!(!lane.is_enabled());
        assert_eq!(lane.acquire(7), None);
        lane.release(7, None);
        assert_eq!(lane.turn(), 0, "停用的通道不推进轮次");
    }

    #[test]
    fn test_token_passes_in_ticket_order() {
        let lane = Arc::new(HandoffLane::new(Some(Vec::<u64>::new())));
        let mut handles = Vec::new();
        // 逆序启动, 令牌仍按序号传递
        for ticket in (0..4u64).rev() {
            let lane = Arc::clone(&lane);
            handles.push(thread::spawn(move || {
                let mut token = lane.acquire(ticket).expect("启用的通道应交出令牌");
                token.push(ticket);
                thread::sleep(Duration::from_millis(2));
                lane.release(ticket, Some(token));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let order = lane.acquire(4).unwrap();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
