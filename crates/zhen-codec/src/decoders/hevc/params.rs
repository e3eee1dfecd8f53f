//! 访问单元携带的序列参数、参考图像集与 slice 头.

use std::sync::Arc;

use zhen_core::{PixelFormat, ZhenError, ZhenResult};

/// HEVC NAL 单元类型 (VCL 部分)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// TRAIL_N (非参考尾随图像)
    TrailN,
    /// TRAIL_R (参考尾随图像)
    TrailR,
    /// TSA_N
    TsaN,
    /// TSA_R
    TsaR,
    /// STSA_N
    StsaN,
    /// STSA_R
    StsaR,
    /// RADL_N
    RadlN,
    /// RADL_R
    RadlR,
    /// RASL_N
    RaslN,
    /// RASL_R
    RaslR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    /// BLA_W_RADL
    BlaWRadl,
    /// BLA_N_LP
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    /// IDR_N_LP
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
}

impl NalUnitType {
    /// 从类型编号创建, 非图像类型返回 `None`
    pub fn from_type_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            _ => return None,
        })
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
        }
    }

    /// 是否为 IRAP (IDR/CRA/BLA)
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=21)
    }

    /// 是否为 IDR
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// 是否为 BLA
    pub fn is_bla(&self) -> bool {
        matches!(self, Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp)
    }

    /// 是否为 RASL
    pub fn is_rasl(&self) -> bool {
        matches!(self, Self::RaslN | Self::RaslR)
    }
}

/// slice 类型 (编号与 HEVC slice_type 一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    B,
    P,
    I,
}

impl SliceType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::B),
            1 => Some(Self::P),
            2 => Some(Self::I),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::B => 0,
            Self::P => 1,
            Self::I => 2,
        }
    }

    /// 需要构建的参考列表数
    pub fn nb_lists(self) -> usize {
        match self {
            Self::B => 2,
            Self::P => 1,
            Self::I => 0,
        }
    }
}

/// 序列参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqParams {
    pub width: u16,
    pub height: u16,
    pub bit_depth: u8,
    pub chroma_format_idc: u8,
    pub log2_ctb_size: u8,
    pub log2_max_poc_lsb: u8,
    /// 最高时域层的 max_dec_pic_buffering
    pub max_dec_pic_buffering: u8,
    /// 最高时域层的 num_reorder_pics
    pub num_reorder_pics: u8,
    /// CTB 光栅扫描地址到 tile 扫描地址的映射, `None` 表示单 tile (恒等映射)
    pub ctb_addr_rs_to_ts: Option<Arc<[u32]>>,
}

impl SeqParams {
    /// 以常用取值创建 4:2:0 8 位序列参数
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            chroma_format_idc: 1,
            log2_ctb_size: 4,
            log2_max_poc_lsb: 8,
            max_dec_pic_buffering: 6,
            num_reorder_pics: 2,
            ctb_addr_rs_to_ts: None,
        }
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_chroma_format(self.chroma_format_idc, self.bit_depth)
    }

    pub fn ctb_size(&self) -> u32 {
        1 << self.log2_ctb_size
    }

    pub fn ctb_width(&self) -> usize {
        (self.width as usize).div_ceil(self.ctb_size() as usize)
    }

    pub fn ctb_height(&self) -> usize {
        (self.height as usize).div_ceil(self.ctb_size() as usize)
    }

    pub fn ctb_count(&self) -> usize {
        self.ctb_width() * self.ctb_height()
    }

    /// 光栅扫描地址转 tile 扫描地址
    pub fn rs_to_ts(&self, ctb_addr_rs: usize) -> usize {
        match &self.ctb_addr_rs_to_ts {
            Some(map) => map.get(ctb_addr_rs).map_or(ctb_addr_rs, |&ts| ts as usize),
            None => ctb_addr_rs,
        }
    }

    /// 图像尺寸与格式是否相同 (决定参考帧能否跨单元复用)
    pub fn same_geometry(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.bit_depth == other.bit_depth
            && self.chroma_format_idc == other.chroma_format_idc
            && self.log2_ctb_size == other.log2_ctb_size
    }

    pub fn validate(&self) -> ZhenResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: 图像尺寸无效 {}x{}",
                self.width, self.height
            )));
        }
        if self.pixel_format().is_none() {
            return Err(ZhenError::Unsupported(format!(
                "HEVC: 不支持 chroma_format_idc={}, bit_depth={}",
                self.chroma_format_idc, self.bit_depth
            )));
        }
        if !(4..=6).contains(&self.log2_ctb_size) {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: log2_ctb_size={} 超出范围",
                self.log2_ctb_size
            )));
        }
        if !(4..=16).contains(&self.log2_max_poc_lsb) {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: log2_max_poc_lsb={} 超出范围",
                self.log2_max_poc_lsb
            )));
        }
        if self.max_dec_pic_buffering == 0 || self.max_dec_pic_buffering > 16 {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: max_dec_pic_buffering={} 超出范围",
                self.max_dec_pic_buffering
            )));
        }
        if self.num_reorder_pics >= self.max_dec_pic_buffering {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: num_reorder_pics={} 大于 max_dec_pic_buffering - 1",
                self.num_reorder_pics
            )));
        }
        if let Some(map) = &self.ctb_addr_rs_to_ts {
            let count = self.ctb_count();
            if map.len() != count || map.iter().any(|&ts| ts as usize >= count) {
                return Err(ZhenError::InvalidData(
                    "HEVC: CTB 扫描映射与图像尺寸不符".into(),
                ));
            }
        }
        Ok(())
    }
}

/// 短期参考图像条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortTermRef {
    /// 相对当前 POC 的差值
    pub delta_poc: i32,
    /// 是否被当前图像使用
    pub used: bool,
}

/// 短期参考图像集
///
/// 前 `num_negative_pics` 项是 POC 小于当前图像的参考帧.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortTermRps {
    pub num_negative_pics: u8,
    pub entries: Vec<ShortTermRef>,
}

impl ShortTermRps {
    pub fn new(num_negative_pics: u8, entries: &[(i32, bool)]) -> Self {
        Self {
            num_negative_pics,
            entries: entries
                .iter()
                .map(|&(delta_poc, used)| ShortTermRef { delta_poc, used })
                .collect(),
        }
    }
}

/// 长期参考图像条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermRef {
    /// 完整 POC (msb_present) 或 POC 低位
    pub poc: i32,
    pub used: bool,
    pub poc_msb_present: bool,
}

/// slice 头中与参考列表有关的部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    /// 首个 CTB 的光栅扫描地址
    pub segment_addr: u16,
    pub slice_type: SliceType,
    /// 各列表的参考帧数 (num_ref_idx_active)
    pub nb_refs: [u8; 2],
    /// 显式重排列表 (list_entry_lx), `None` 表示不重排
    pub list_entry: [Option<Vec<u8>>; 2],
    pub collocated_list: u8,
    pub collocated_ref_idx: u8,
}

impl SliceHeader {
    /// I slice
    pub fn intra() -> Self {
        Self {
            segment_addr: 0,
            slice_type: SliceType::I,
            nb_refs: [0, 0],
            list_entry: [None, None],
            collocated_list: 0,
            collocated_ref_idx: 0,
        }
    }

    /// P slice
    pub fn p(nb_l0: u8) -> Self {
        Self {
            slice_type: SliceType::P,
            nb_refs: [nb_l0, 0],
            ..Self::intra()
        }
    }

    /// B slice
    pub fn b(nb_l0: u8, nb_l1: u8) -> Self {
        Self {
            slice_type: SliceType::B,
            nb_refs: [nb_l0, nb_l1],
            collocated_list: 1,
            ..Self::intra()
        }
    }

    /// 设置起始 CTB
    pub fn at(mut self, segment_addr: u16) -> Self {
        self.segment_addr = segment_addr;
        self
    }

    /// 设置显式重排列表
    pub fn with_modification(mut self, list: usize, entries: Vec<u8>) -> Self {
        self.list_entry[list] = Some(entries);
        self
    }

    /// 设置 collocated 参考帧
    pub fn with_collocated(mut self, list: u8, ref_idx: u8) -> Self {
        self.collocated_list = list;
        self.collocated_ref_idx = ref_idx;
        self
    }

    pub fn rpl_modification_flag(&self, list: usize) -> bool {
        self.list_entry[list].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_unit_type_classes() {
        let cra = NalUnitType::from_type_id(21).unwrap();
        assert!(cra.is_irap());
        assert!(!cra.is_idr());
        assert!(NalUnitType::IdrNLp.is_idr());
        assert!(NalUnitType::BlaWRadl.is_bla());
        assert!(NalUnitType::RaslR.is_rasl());
        assert!(!NalUnitType::TrailR.is_irap());
        assert_eq!(NalUnitType::from_type_id(32), None, "参数集不是图像类型");
        for id in [0u8, 1, 8, 9, 16, 19, 21] {
            assert_eq!(NalUnitType::from_type_id(id).unwrap().type_id(), id);
        }
    }

    #[test]
    fn test_ctb_geometry() {
        let sps = SeqParams::new(100, 40);
        assert_eq!(sps.ctb_size(), 16);
        assert_eq!(sps.ctb_width(), 7);
        assert_eq!(sps.ctb_height(), 3);
        assert_eq!(sps.ctb_count(), 21);
        assert_eq!(sps.rs_to_ts(5), 5, "无映射时为恒等映射");
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let mut sps = SeqParams::new(64, 64);
        assert!(sps.validate().is_ok());
        sps.num_reorder_pics = sps.max_dec_pic_buffering;
        assert!(sps.validate().is_err());

        let mut sps = SeqParams::new(64, 64);
        sps.bit_depth = 12;
        assert!(matches!(sps.validate(), Err(ZhenError::Unsupported(_))));

        let mut sps = SeqParams::new(32, 32);
        sps.ctb_addr_rs_to_ts = Some(Arc::from(vec![0u32, 1, 2]));
        assert!(sps.validate().is_err(), "映射长度必须等于 CTB 数");
    }
}
