//! 解码器 trait 定义.
//!
//! 单线程解码器与帧线程适配器都实现 `Decoder` trait.

use zhen_core::ZhenResult;

use crate::codec_parameters::StreamParams;
use crate::frame::VideoFrame;
use crate::packet::Packet;

/// 解码器 trait
///
/// 解码流程:
/// 1. 调用 `send_packet()` 送入压缩数据
/// 2. 调用 `receive_frame()` 取出解码后的帧
/// 3. 重复以上步骤直到所有数据处理完毕
/// 4. 送入空包 (flush) 以获取解码器中缓存的帧
pub trait Decoder: Send {
    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 使用流参数配置解码器
    ///
    /// 默认实现为空操作, 参数可以完全从码流中得到的解码器无需覆盖.
    fn open(&mut self, _params: &StreamParams) -> ZhenResult<()> {
        Ok(())
    }

    /// 送入一个压缩数据包进行解码
    ///
    /// # 参数
    /// - `packet`: 压缩数据包. 送入空包表示流结束, 之后可取出缓存帧.
    ///
    /// # 返回
    /// - `Ok(())`: 数据包已接受
    /// - `Err(ZhenError::PipelineFull)`: 内部缓冲区已满, 需要先取出帧
    fn send_packet(&mut self, packet: &Packet) -> ZhenResult<()>;

    /// 从解码器取出一帧解码数据
    ///
    /// # 返回
    /// - `Ok(frame)`: 成功取出一帧
    /// - `Err(ZhenError::NeedMoreData)`: 需要送入更多数据包
    /// - `Err(ZhenError::Eof)`: 所有帧已取出
    /// - 其他错误: 某个访问单元解码失败, 解码器本身仍然可用
    fn receive_frame(&mut self) -> ZhenResult<VideoFrame>;

    /// 刷新解码器, 清空内部状态
    ///
    /// 用于 seek 后重置解码器状态.
    fn flush(&mut self);
}
