//! 合成访问单元语法.
//!
//! 一个数据包承载一个访问单元 (一幅图像), 所有多字节字段为大端序:
//!
//! ```text
//! magic "ZAU1" (4 bytes)
//! nal_type u8
//! flags u8: bit0 pic_output, bit1 no_output_of_prior_pics,
//!           bit2 curr_pic_ref, bit3 eos
//! poc i32
//! width u16, height u16
//! bit_depth u8, chroma_format u8, log2_ctb_size u8, log2_max_poc_lsb u8,
//! max_dec_pic_buffering u8, num_reorder_pics u8
//! fill u16: 重建时使用的基准采样值
//! st_rps: count u8, num_negative u8, count * (delta_poc i32, used u8)
//! lt_rps: count u8, count * (poc i32, used u8, msb_present u8)
//! slices: count u8 (>= 1), count * (
//!     segment_addr u16, slice_type u8, nb_refs[2] u8,
//!     2 * (has_mod u8, [nb_refs entries u8 if has_mod]),
//!     collocated_list u8, collocated_ref_idx u8)
//! ```
//!
//! IDR 单元的 st_rps 数量必须为 0, 解析后为 `None`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use zhen_core::{ZhenError, ZhenResult};

use super::dpb::MAX_REFS;
use super::params::{
    LongTermRef, NalUnitType, SeqParams, ShortTermRef, ShortTermRps, SliceHeader, SliceType,
};

const UNIT_MAGIC: &[u8; 4] = b"ZAU1";

const FLAG_PIC_OUTPUT: u8 = 1 << 0;
const FLAG_NO_OUTPUT_OF_PRIOR_PICS: u8 = 1 << 1;
const FLAG_CURR_PIC_REF: u8 = 1 << 2;
const FLAG_EOS: u8 = 1 << 3;

/// 一个访问单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub nal_type: NalUnitType,
    pub poc: i32,
    pub pic_output: bool,
    pub no_output_of_prior_pics: bool,
    /// 当前图像可作为自身参考 (pps_curr_pic_ref_enabled_flag)
    pub curr_pic_ref: bool,
    /// 本单元之后是序列结束
    pub eos: bool,
    pub sps: SeqParams,
    pub fill: u16,
    pub short_term: Option<ShortTermRps>,
    pub long_term: Vec<LongTermRef>,
    pub slices: Vec<SliceHeader>,
}

impl AccessUnit {
    /// 创建只含一个 I slice 的单元, 基准采样值为中间电平
    pub fn new(nal_type: NalUnitType, poc: i32, sps: SeqParams) -> Self {
        let fill = 1u16 << (sps.bit_depth.clamp(1, 16) - 1);
        Self {
            nal_type,
            poc,
            pic_output: true,
            no_output_of_prior_pics: false,
            curr_pic_ref: false,
            eos: false,
            sps,
            fill,
            short_term: if nal_type.is_idr() {
                None
            } else {
                Some(ShortTermRps::default())
            },
            long_term: Vec::new(),
            slices: vec![SliceHeader::intra()],
        }
    }

    pub fn with_short_term(mut self, rps: ShortTermRps) -> Self {
        self.short_term = Some(rps);
        self
    }

    pub fn with_long_term(mut self, refs: Vec<LongTermRef>) -> Self {
        self.long_term = refs;
        self
    }

    pub fn with_slices(mut self, slices: Vec<SliceHeader>) -> Self {
        self.slices = slices;
        self
    }

    pub fn with_fill(mut self, fill: u16) -> Self {
        self.fill = fill;
        self
    }

    /// 序列化为数据包载荷
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_slice(UNIT_MAGIC);
        buf.put_u8(self.nal_type.type_id());
        let mut flags = 0;
        if self.pic_output {
            flags |= FLAG_PIC_OUTPUT;
        }
        if self.no_output_of_prior_pics {
            flags |= FLAG_NO_OUTPUT_OF_PRIOR_PICS;
        }
        if self.curr_pic_ref {
            flags |= FLAG_CURR_PIC_REF;
        }
        if self.eos {
            flags |= FLAG_EOS;
        }
        buf.put_u8(flags);
        buf.put_i32(self.poc);

        let sps = &self.sps;
        buf.put_u16(sps.width);
        buf.put_u16(sps.height);
        buf.put_u8(sps.bit_depth);
        buf.put_u8(sps.chroma_format_idc);
        buf.put_u8(sps.log2_ctb_size);
        buf.put_u8(sps.log2_max_poc_lsb);
        buf.put_u8(sps.max_dec_pic_buffering);
        buf.put_u8(sps.num_reorder_pics);
        buf.put_u16(self.fill);

        match &self.short_term {
            Some(rps) => {
                buf.put_u8(rps.entries.len() as u8);
                buf.put_u8(rps.num_negative_pics);
                for entry in &rps.entries {
                    buf.put_i32(entry.delta_poc);
                    buf.put_u8(u8::from(entry.used));
                }
            }
            None => {
                buf.put_u8(0);
                buf.put_u8(0);
            }
        }

        buf.put_u8(self.long_term.len() as u8);
        for entry in &self.long_term {
            buf.put_i32(entry.poc);
            buf.put_u8(u8::from(entry.used));
            buf.put_u8(u8::from(entry.poc_msb_present));
        }

        buf.put_u8(self.slices.len() as u8);
        for slice in &self.slices {
            buf.put_u16(slice.segment_addr);
            buf.put_u8(slice.slice_type.as_u8());
            buf.put_slice(&slice.nb_refs);
            for list in &slice.list_entry {
                match list {
                    Some(entries) => {
                        buf.put_u8(1);
                        buf.put_slice(entries);
                    }
                    None => buf.put_u8(0),
                }
            }
            buf.put_u8(slice.collocated_list);
            buf.put_u8(slice.collocated_ref_idx);
        }
        buf.freeze()
    }

    /// 解析数据包载荷
    pub fn parse(data: &[u8]) -> ZhenResult<Self> {
        let mut r = UnitReader { buf: data };
        if r.take(4)? != UNIT_MAGIC {
            return Err(ZhenError::InvalidData("HEVC: 访问单元标识无效".into()));
        }
        let type_id = r.u8()?;
        let nal_type = NalUnitType::from_type_id(type_id).ok_or_else(|| {
            ZhenError::InvalidData(format!("HEVC: 不支持的 NAL 类型 {}", type_id))
        })?;
        let flags = r.u8()?;
        let poc = r.i32()?;

        let sps = SeqParams {
            width: r.u16()?,
            height: r.u16()?,
            bit_depth: r.u8()?,
            chroma_format_idc: r.u8()?,
            log2_ctb_size: r.u8()?,
            log2_max_poc_lsb: r.u8()?,
            max_dec_pic_buffering: r.u8()?,
            num_reorder_pics: r.u8()?,
            ctb_addr_rs_to_ts: None,
        };
        sps.validate()?;
        let fill = r.u16()?;
        if u32::from(fill) >= 1u32 << sps.bit_depth {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: 基准采样值 {} 超出 {} 位范围",
                fill, sps.bit_depth
            )));
        }

        let st_count = usize::from(r.u8()?);
        let num_negative_pics = r.u8()?;
        if usize::from(num_negative_pics) > st_count {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: num_negative_pics={} 大于短期 RPS 项数 {}",
                num_negative_pics, st_count
            )));
        }
        let mut entries = Vec::with_capacity(st_count);
        for _ in 0..st_count {
            entries.push(ShortTermRef {
                delta_poc: r.i32()?,
                used: r.flag()?,
            });
        }
        let short_term = if nal_type.is_idr() {
            if st_count != 0 {
                return Err(ZhenError::InvalidData("HEVC: IDR 单元带有短期 RPS".into()));
            }
            None
        } else {
            Some(ShortTermRps {
                num_negative_pics,
                entries,
            })
        };

        let lt_count = usize::from(r.u8()?);
        let mut long_term = Vec::with_capacity(lt_count);
        for _ in 0..lt_count {
            long_term.push(LongTermRef {
                poc: r.i32()?,
                used: r.flag()?,
                poc_msb_present: r.flag()?,
            });
        }

        let slice_count = usize::from(r.u8()?);
        if slice_count == 0 {
            return Err(ZhenError::InvalidData("HEVC: 访问单元没有 slice".into()));
        }
        let mut slices = Vec::with_capacity(slice_count);
        for _ in 0..slice_count {
            slices.push(r.slice_header()?);
        }

        if r.buf.has_remaining() {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: 访问单元末尾多出 {} 字节",
                r.buf.remaining()
            )));
        }

        Ok(Self {
            nal_type,
            poc,
            pic_output: flags & FLAG_PIC_OUTPUT != 0,
            no_output_of_prior_pics: flags & FLAG_NO_OUTPUT_OF_PRIOR_PICS != 0,
            curr_pic_ref: flags & FLAG_CURR_PIC_REF != 0,
            eos: flags & FLAG_EOS != 0,
            sps,
            fill,
            short_term,
            long_term,
            slices,
        })
    }
}

/// 带长度检查的大端读取器
struct UnitReader<'a> {
    buf: &'a [u8],
}

impl<'a> UnitReader<'a> {
    fn ensure(&self, len: usize) -> ZhenResult<()> {
        if self.buf.remaining() < len {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: 访问单元被截断, 需要 {} 字节, 剩余 {}",
                len,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> ZhenResult<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> ZhenResult<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn flag(&mut self) -> ZhenResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(ZhenError::InvalidData(format!("HEVC: 标志字段取值 {} 无效", v))),
        }
    }

    fn u16(&mut self) -> ZhenResult<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    fn i32(&mut self) -> ZhenResult<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    fn slice_header(&mut self) -> ZhenResult<SliceHeader> {
        let segment_addr = self.u16()?;
        let raw_type = self.u8()?;
        let slice_type = SliceType::from_u8(raw_type).ok_or_else(|| {
            ZhenError::InvalidData(format!("HEVC: slice_type={} 无效", raw_type))
        })?;
        let nb_refs = [self.u8()?, self.u8()?];
        for (list, &count) in nb_refs.iter().enumerate() {
            if usize::from(count) > MAX_REFS {
                return Err(ZhenError::InvalidData(format!(
                    "HEVC: num_ref_idx_l{}={} 超过 {}",
                    list, count, MAX_REFS
                )));
            }
        }
        let mut list_entry: [Option<Vec<u8>>; 2] = [None, None];
        for (list, entry) in list_entry.iter_mut().enumerate() {
            if self.flag()? {
                *entry = Some(self.take(usize::from(nb_refs[list]))?.to_vec());
            }
        }
        let collocated_list = self.u8()?;
        if collocated_list > 1 {
            return Err(ZhenError::InvalidData(format!(
                "HEVC: collocated_list={} 无效",
                collocated_list
            )));
        }
        let collocated_ref_idx = self.u8()?;
        Ok(SliceHeader {
            segment_addr,
            slice_type,
            nb_refs,
            list_entry,
            collocated_list,
            collocated_ref_idx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_unit() -> AccessUnit {
        let mut sps = SeqParams::new(64, 32);
        sps.bit_depth = 10;
        AccessUnit::new(NalUnitType::TrailR, 5, sps)
            .with_short_term(ShortTermRps::new(1, &[(-1, true), (3, false)]))
            .with_long_term(vec![LongTermRef {
                poc: 0,
                used: true,
                poc_msb_present: false,
            }])
            .with_slices(vec![
                SliceHeader::b(2, 1).with_modification(0, vec![1, 0]),
                SliceHeader::p(1).at(4).with_collocated(0, 0),
            ])
            .with_fill(700)
    }

    #[test]
    fn test_encode_parse() {
        let mut unit = sample_unit();
        unit.curr_pic_ref = true;
        unit.eos = true;
        let parsed = AccessUnit::parse(&unit.encode()).unwrap();
        assert_eq!(parsed, unit);
    }

    #[test]
    fn test_idr_defaults() {
        let unit = AccessUnit::new(NalUnitType::IdrWRadl, 0, SeqParams::new(16, 16));
        assert!(unit.short_term.is_none());
        assert_eq!(unit.fill, 128);
        let parsed = AccessUnit::parse(&unit.encode()).unwrap();
        assert!(parsed.short_term.is_none());
        assert_eq!(parsed.slices, vec![SliceHeader::intra()]);
    }

    #[test]
    fn test_truncated_unit_rejected() {
        let data = sample_unit().encode();
        for len in [0, 3, 10, data.len() - 1] {
            let err = AccessUnit::parse(&data[..len]).unwrap_err();
            assert!(err.is_data_error(), "截断到 {} 字节应返回数据错误: {}", len, err);
        }
    }

    #[test]
    fn test_malformed_unit_rejected() {
        let data = sample_unit().encode().to_vec();

        let mut bad_magic = data.clone();
        bad_magic[0] = b'X';
        assert!(AccessUnit::parse(&bad_magic).is_err());

        let mut bad_nal = data.clone();
        bad_nal[4] = 40;
        assert!(AccessUnit::parse(&bad_nal).is_err());

        let mut trailing = data.clone();
        trailing.push(0);
        assert!(AccessUnit::parse(&trailing).is_err());

        // fill 超出 10 位范围
        let mut bad_fill = data;
        bad_fill[20] = 0x04;
        bad_fill[21] = 0x00;
        assert!(AccessUnit::parse(&bad_fill).is_err());
    }

    #[test]
    fn test_idr_with_short_term_rejected() {
        let mut unit = AccessUnit::new(NalUnitType::IdrNLp, 0, SeqParams::new(16, 16));
        unit.short_term = Some(ShortTermRps::new(1, &[(-1, true)]));
        assert!(AccessUnit::parse(&unit.encode()).is_err());
    }
}
