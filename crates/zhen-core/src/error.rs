//! 统一错误类型定义.
//!
//! 所有 zhen crate 共用的错误类型. 单元级错误 (DPB 已满、POC 重复、参考索引越界等)
//! 只影响当前访问单元; 线程池构造类错误会中止构造.

use thiserror::Error;

/// zhen 框架统一错误类型
#[derive(Debug, Error)]
pub enum ZhenError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// DPB 没有空闲槽位
    #[error("分配帧失败, DPB 已满")]
    DpbFull,

    /// 同一解码序列中出现重复 POC
    #[error("序列内 POC 重复: {0}")]
    DuplicatePoc(i32),

    /// 显式重排索引超出候选池
    #[error("无效参考索引: list={list}, index={index}, 候选数={available}")]
    InvalidRefIndex {
        list: usize,
        index: usize,
        available: usize,
    },

    /// 帧 RPS 中没有任何参考帧
    #[error("帧 RPS 中参考帧数为零")]
    ZeroRefs,

    /// 线程池构造失败 (线程创建、上下文初始化)
    #[error("帧线程初始化失败: {0}")]
    ThreadSetup(String),

    /// 所有槽位都持有未取出的结果, 需要先取出帧再提交
    #[error("帧线程槽位已满, 需要先取出结果")]
    PipelineFull,

    /// 跨线程上下文传播失败
    #[error("上下文传播失败: {0}")]
    Propagation(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ZhenError {
    /// 是否为码流损坏类错误
    ///
    /// 此类错误只丢弃当前访问单元的输出, 解码继续.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidData(_)
                | Self::DuplicatePoc(_)
                | Self::InvalidRefIndex { .. }
                | Self::ZeroRefs
        )
    }

    /// 是否为资源耗尽类错误
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::DpbFull | Self::OutOfMemory(_))
    }
}

/// zhen 框架统一 Result 类型
pub type ZhenResult<T> = Result<T, ZhenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ZhenError::DuplicatePoc(3).is_data_error());
        assert!(ZhenError::ZeroRefs.is_data_error());
        assert!(
            ZhenError::InvalidRefIndex {
                list: 0,
                index: 4,
                available: 2
            }
            .is_data_error()
        );
        assert!(ZhenError::DpbFull.is_resource_error());
        assert!(!ZhenError::DpbFull.is_data_error());
        assert!(!ZhenError::Eof.is_resource_error());
    }

    #[test]
    fn test_error_display() {
        let err = ZhenError::InvalidRefIndex {
            list: 1,
            index: 5,
            available: 3,
        };
        assert_eq!(err.to_string(), "无效参考索引: list=1, index=5, 候选数=3");
        assert_eq!(ZhenError::DuplicatePoc(8).to_string(), "序列内 POC 重复: 8");
    }
}
