/// YCbCr 色彩空间 (矩阵系数)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ColorSpace {
    /// 未指定
    #[default]
    Unspecified,
    /// ITU-R BT.709
    Bt709,
    /// ITU-R BT.601 (SMPTE 170M)
    Bt601,
    /// ITU-R BT.2020 非恒定亮度
    Bt2020Ncl,
}

