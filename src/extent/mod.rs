//! Extent 映射操作
//!
//! inode 的 extent 表把文件的逻辑块映射到物理块。深度 0 的表
//! 直接映射数据块；深度 1 的表指向 extent 块，extent 块里的
//! 深度 0 表再映射数据块。调优引擎只在目录扩展时追加映射，
//! 追加发生在 inode 的直接表上。

use crate::block::{BlockDev, BlockDevice};
use crate::consts::*;
use crate::crc::{seal_block, verify_block, CFS_BLOCK_CHECK_OFFSET};
use crate::error::{CorruptKind, Error, ErrorKind, Result};
use crate::inode::Inode;
use crate::superblock::Superblock;
use crate::types::{cfs_extent_block, ExtentList, ExtentRec, CFS_EXTENT_LIST_OFFSET, CFS_INODE_LIST_OFFSET};
use alloc::vec::Vec;

/// Extent 块包装器
pub struct ExtentBlock {
    pub(crate) inner: cfs_extent_block,
    pub(crate) buf: Vec<u8>,
}

/// 从块设备读取一个 extent 块
pub fn read_extent_block<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
) -> Result<ExtentBlock> {
    let buf = bdev.read_block_vec(blkno)?;

    if sb.meta_csum() {
        verify_block(&buf, CFS_BLOCK_CHECK_OFFSET, blkno)?;
    }

    let inner = cfs_extent_block::from_block(&buf);
    if !inner.is_valid() {
        return Err(Error::corrupt(
            CorruptKind::BadSignature,
            blkno,
            "invalid extent block signature",
        ));
    }

    Ok(ExtentBlock { inner, buf })
}

/// 把 extent 块写回块设备
pub fn write_extent_block<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    eb: &mut ExtentBlock,
) -> Result<()> {
    eb.inner.write_to(&mut eb.buf);
    write_extent_block_raw(bdev, sb, eb.blkno(), &mut eb.buf)
}

/// 把一个 extent 块缓冲写回设备（写缓存的 extent 块写回例程）
pub fn write_extent_block_raw<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
    buf: &mut [u8],
) -> Result<()> {
    if sb.meta_csum() {
        seal_block(buf, CFS_BLOCK_CHECK_OFFSET);
    }
    log::trace!("[EXTENT] write {}", blkno);
    bdev.write_block(blkno, buf)
}

impl ExtentBlock {
    /// 获取块号
    pub fn blkno(&self) -> u64 {
        self.inner.blkno()
    }

    /// 获取所属分配器槽位
    pub fn suballoc_slot(&self) -> u16 {
        u16::from_le(self.inner.eb_suballoc_slot)
    }

    /// 设置所属分配器槽位
    pub fn set_suballoc_slot(&mut self, slot: u16) {
        self.inner.eb_suballoc_slot = slot.to_le();
    }

    /// 解码本块的 extent 表
    pub fn extent_list(&self) -> Result<ExtentList> {
        ExtentList::decode(&self.buf, CFS_EXTENT_LIST_OFFSET)
    }

    /// 把 extent 表编码回缓冲
    pub fn set_extent_list(&mut self, el: &ExtentList) {
        el.encode(&mut self.buf, CFS_EXTENT_LIST_OFFSET);
    }
}

/// 在深度 0 的表里查找逻辑块
fn lookup_in_list(el: &ExtentList, logical: u32) -> Option<u64> {
    for rec in &el.recs {
        if logical >= rec.e_cpos && logical < rec.e_cpos + rec.e_blocks {
            return Some(rec.e_blkno + (logical - rec.e_cpos) as u64);
        }
    }
    None
}

/// 把 inode 的逻辑块号翻译成物理块号
///
/// 支持深度 0（inode 直接映射）和深度 1（经过一层 extent 块）。
pub fn extent_block_for<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    inode: &Inode,
    logical: u32,
) -> Result<u64> {
    let el = inode.extent_list()?;

    if el.l_tree_depth == 0 {
        return lookup_in_list(&el, logical)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "logical block not mapped").with_blkno(inode.blkno()));
    }

    // 深度 1：找到覆盖 logical 的子树记录，进入 extent 块
    for rec in &el.recs {
        if logical >= rec.e_cpos && logical < rec.e_cpos + rec.e_blocks {
            let eb = read_extent_block(bdev, sb, rec.e_blkno)?;
            let leaf = eb.extent_list()?;
            return lookup_in_list(&leaf, logical)
                .ok_or_else(|| Error::corrupt(
                    CorruptKind::BadSignature,
                    rec.e_blkno,
                    "extent block does not cover its parent record",
                ));
        }
    }

    Err(Error::new(ErrorKind::NotFound, "logical block not mapped").with_blkno(inode.blkno()))
}

/// 遍历 inode 的每一个元数据 extent 块
///
/// 深度 0 的 inode 没有 extent 块，回调不会被调用。
pub fn extent_iterate_meta<D: BlockDevice, F>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    inode: &Inode,
    mut func: F,
) -> Result<()>
where
    F: FnMut(&mut BlockDev<D>, &ExtentBlock) -> Result<()>,
{
    let el = inode.extent_list()?;
    if el.l_tree_depth == 0 {
        return Ok(());
    }

    for rec in &el.recs {
        let eb = read_extent_block(bdev, sb, rec.e_blkno)?;
        func(bdev, &eb)?;
    }
    Ok(())
}

/// 在 inode 的直接表尾部追加一个数据块映射
///
/// 新块的逻辑位置是当前簇数。与最后一条记录物理相邻时直接
/// 扩展该记录，否则新增记录；表满则报错，调用方按空间不足处理。
/// 只更新内存里的映射和簇数，`i_size` 和落盘都由调用方决定：
/// 新块在大小更新之前对读者不可见。
pub fn extent_append_block(inode: &mut Inode, phys_blkno: u64) -> Result<()> {
    let mut el = inode.extent_list()?;

    if el.l_tree_depth != 0 {
        return Err(Error::new(
            ErrorKind::Unsupported,
            "appending into an indirected extent tree is not supported",
        ));
    }
    if el.l_count == 0 {
        el.l_count = ExtentList::capacity_for(inode.raw().len(), CFS_INODE_LIST_OFFSET);
    }

    let logical = inode.clusters();
    let merged = match el.recs.last_mut() {
        Some(last)
            if last.e_cpos + last.e_blocks == logical
                && last.e_blkno + last.e_blocks as u64 == phys_blkno =>
        {
            last.e_blocks += 1;
            true
        }
        _ => false,
    };

    if !merged {
        if el.l_next_free_rec >= el.l_count {
            return Err(Error::new(ErrorKind::NoSpace, "inode extent list is full"));
        }
        el.recs.push(ExtentRec {
            e_blkno: phys_blkno,
            e_cpos: logical,
            e_blocks: 1,
        });
        el.l_next_free_rec += 1;
    }

    inode.set_extent_list(&el);
    inode.set_clusters(logical + 1);
    Ok(())
}
