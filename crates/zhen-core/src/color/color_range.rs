/// 色彩范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    /// 未指定
    #[default]
    Unspecified,
    /// 有限范围 (广播/TV)
    Limited,
    /// 完整范围 (JPEG/PC)
    Full,
}
