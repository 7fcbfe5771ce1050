//! 分配组描述符操作
//!
//! 组描述符占一整块：48 字节头部加位图。位 `i` 覆盖块
//! `bg_blkno + i`，位 0 覆盖描述符本身，恒为已分配。

use crate::bitmap;
use crate::block::{BlockDev, BlockDevice};
use crate::consts::*;
use crate::crc::{seal_block, verify_block, CFS_BLOCK_CHECK_OFFSET};
use crate::error::{CorruptKind, Error, Result};
use crate::superblock::Superblock;
use crate::types::{cfs_group_desc, CFS_GROUP_HEADER_SIZE};
use alloc::vec::Vec;

/// 组描述符包装器
///
/// `inner` 是解码后的头部，`buf` 是整块原始数据（位图在其中）。
pub struct GroupDesc {
    pub(crate) inner: cfs_group_desc,
    pub(crate) buf: Vec<u8>,
}

/// 从块设备读取一个组描述符
pub fn read_group_desc<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
) -> Result<GroupDesc> {
    let buf = bdev.read_block_vec(blkno)?;

    if sb.meta_csum() {
        verify_block(&buf, CFS_BLOCK_CHECK_OFFSET, blkno)?;
    }

    let inner = cfs_group_desc::from_block(&buf);
    if !inner.is_valid() {
        return Err(Error::corrupt(
            CorruptKind::BadSignature,
            blkno,
            "invalid group descriptor signature",
        ));
    }

    Ok(GroupDesc { inner, buf })
}

/// 把组描述符写回块设备
pub fn write_group_desc<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    gd: &mut GroupDesc,
) -> Result<()> {
    gd.inner.write_to(&mut gd.buf);
    write_group_desc_raw(bdev, sb, gd.blkno(), &mut gd.buf)
}

/// 把一个组描述符块缓冲写回设备（写缓存的组描述符写回例程）
pub fn write_group_desc_raw<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
    buf: &mut [u8],
) -> Result<()> {
    if sb.meta_csum() {
        seal_block(buf, CFS_BLOCK_CHECK_OFFSET);
    }
    log::trace!("[GROUP] write {}", blkno);
    bdev.write_block(blkno, buf)
}

impl GroupDesc {
    /// 获取块号
    pub fn blkno(&self) -> u64 {
        self.inner.blkno()
    }

    /// 获取头部的引用
    pub fn inner(&self) -> &cfs_group_desc {
        &self.inner
    }

    /// 获取链上下一个组（0 表示链尾）
    pub fn next_group(&self) -> u64 {
        self.inner.next_group()
    }

    /// 设置链上下一个组
    pub fn set_next_group(&mut self, blkno: u64) {
        self.inner.bg_next_group = blkno.to_le();
    }

    /// 获取所属分配器
    pub fn parent_blkno(&self) -> u64 {
        self.inner.parent_blkno()
    }

    /// 设置所属分配器
    pub fn set_parent_blkno(&mut self, blkno: u64) {
        self.inner.bg_parent_blkno = blkno.to_le();
    }

    /// 获取所在链的下标
    pub fn chain(&self) -> u16 {
        self.inner.chain()
    }

    /// 设置所在链的下标
    pub fn set_chain(&mut self, chain: u16) {
        self.inner.bg_chain = chain.to_le();
    }

    /// 获取总位数
    pub fn bits(&self) -> u16 {
        self.inner.bits()
    }

    /// 获取空闲位数
    pub fn free_bits(&self) -> u16 {
        self.inner.free_bits()
    }

    /// 设置空闲位数
    pub fn set_free_bits(&mut self, free: u16) {
        self.inner.bg_free_bits_count = free.to_le();
    }

    /// 获取位图的只读切片
    pub fn bitmap(&self) -> &[u8] {
        let size = self.inner.bitmap_size() as usize;
        &self.buf[CFS_GROUP_HEADER_SIZE..CFS_GROUP_HEADER_SIZE + size]
    }

    /// 获取位图的可变切片
    pub fn bitmap_mut(&mut self) -> &mut [u8] {
        let size = self.inner.bitmap_size() as usize;
        &mut self.buf[CFS_GROUP_HEADER_SIZE..CFS_GROUP_HEADER_SIZE + size]
    }

    /// 扫描位图重新统计空闲位数
    pub fn count_free_bits(&self) -> u32 {
        bitmap::count_free_bits(self.bitmap(), self.bits() as u32)
    }

    /// 某一位是否被占用
    pub fn bit_set(&self, bit: u32) -> bool {
        bitmap::test_bit(self.bitmap(), bit)
    }

    /// 占用一位并同步空闲计数
    pub fn alloc_bit(&mut self, bit: u32) -> Result<()> {
        let bits = self.bits() as u32;
        bitmap::set_bit(self.bitmap_mut(), bit)?;
        debug_assert!(bit < bits);
        self.set_free_bits(self.free_bits() - 1);
        Ok(())
    }

    /// 位所覆盖的块号
    pub fn block_of_bit(&self, bit: u32) -> u64 {
        self.blkno() + bit as u64
    }
}

impl core::fmt::Debug for GroupDesc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GroupDesc")
            .field("blkno", &self.blkno())
            .field("chain", &self.chain())
            .field("bits", &self.bits())
            .field("free_bits", &self.free_bits())
            .field("next_group", &self.next_group())
            .finish()
    }
}
