//! 目录项遍历

use crate::error::Result;
use crate::types::DirEntryHeader;

/// 目录块内的目录项游标
///
/// 从块头顺序走到块尾。带尾部结构的块不需要特殊处理：尾部的
/// 兼容字段就是一个跨度恰好盖住它的死目录项，游标会把它当普通
/// 死项返回，然后正好走到块尾。
pub struct DirEntryCursor<'a> {
    buf: &'a [u8],
    blkno: u64,
    offset: usize,
}

impl<'a> DirEntryCursor<'a> {
    /// 创建游标
    ///
    /// # 参数
    ///
    /// * `buf` - 目录块数据
    /// * `blkno` - 块号（出错时报告用）
    pub fn new(buf: &'a [u8], blkno: u64) -> Self {
        Self {
            buf,
            blkno,
            offset: 0,
        }
    }

    /// 取下一个目录项
    ///
    /// 返回 `(块内偏移, 头部)`；走到块尾返回 `None`。
    /// 项的跨度非法时整个目录按损坏处理。
    pub fn next_entry(&mut self) -> Result<Option<(usize, DirEntryHeader)>> {
        if self.offset >= self.buf.len() {
            return Ok(None);
        }

        let offset = self.offset;
        let hdr = DirEntryHeader::decode(self.buf, offset, self.blkno)?;
        self.offset += hdr.rec_len as usize;

        Ok(Some((offset, hdr)))
    }
}
