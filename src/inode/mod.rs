//! Inode 操作
//!
//! inode 占一整块：固定头部加链表或 extent 表。
//! [`Inode`] 包装器持有整块缓冲，表区域的改动通过
//! [`ChainList`]/[`ExtentList`] 解码、修改、编码回缓冲。

use crate::block::{BlockDev, BlockDevice};
use crate::consts::*;
use crate::crc::{seal_block, verify_block, CFS_BLOCK_CHECK_OFFSET};
use crate::error::{CorruptKind, Error, ErrorKind, Result};
use crate::superblock::Superblock;
use crate::types::{cfs_dinode, ChainList, ExtentList, CFS_INODE_LIST_OFFSET};
use alloc::vec::Vec;

/// Inode 包装器
///
/// `inner` 是解码后的固定头部，`buf` 是整块原始数据。
/// 写回时头部先序列化进 `buf`，保证两者一致。
pub struct Inode {
    pub(crate) inner: cfs_dinode,
    pub(crate) buf: Vec<u8>,
}

/// 从块设备读取一个 inode
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock 引用
/// * `blkno` - inode 块号
pub fn read_inode<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
) -> Result<Inode> {
    let buf = bdev.read_block_vec(blkno)?;

    if sb.meta_csum() {
        verify_block(&buf, CFS_BLOCK_CHECK_OFFSET, blkno)?;
    }

    let inner = cfs_dinode::from_block(&buf);
    if !inner.is_valid() {
        return Err(Error::corrupt(
            CorruptKind::BadSignature,
            blkno,
            "invalid inode signature",
        ));
    }
    if inner.blkno() != blkno {
        return Err(Error::corrupt(
            CorruptKind::BadSignature,
            blkno,
            "inode block number does not match its location",
        ));
    }

    Ok(Inode { inner, buf })
}

/// 把 inode 写回块设备
pub fn write_inode<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    inode: &mut Inode,
) -> Result<()> {
    inode.inner.write_to(&mut inode.buf);
    write_inode_raw(bdev, sb, inode.blkno(), &mut inode.buf)
}

/// 把一个 inode 块缓冲写回设备（写缓存的 inode 写回例程）
///
/// 卷开启元数据校验和时重算校验和。
pub fn write_inode_raw<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
    buf: &mut [u8],
) -> Result<()> {
    if sb.meta_csum() {
        seal_block(buf, CFS_BLOCK_CHECK_OFFSET);
    }
    log::trace!("[INODE] write {}", blkno);
    bdev.write_block(blkno, buf)
}

impl Inode {
    /// 获取块号
    pub fn blkno(&self) -> u64 {
        self.inner.blkno()
    }

    /// 获取固定头部的引用
    pub fn inner(&self) -> &cfs_dinode {
        &self.inner
    }

    /// 获取整块缓冲
    pub fn raw(&self) -> &[u8] {
        &self.buf
    }

    /// 是否是目录
    pub fn is_dir(&self) -> bool {
        self.inner.is_dir()
    }

    /// 是否是链式分配器 inode
    pub fn is_chain(&self) -> bool {
        self.inner.is_chain()
    }

    /// 获取字节大小
    pub fn size(&self) -> u64 {
        self.inner.size()
    }

    /// 设置字节大小
    pub fn set_size(&mut self, size: u64) {
        self.inner.i_size = size.to_le();
    }

    /// 获取占用的簇数
    pub fn clusters(&self) -> u32 {
        u32::from_le(self.inner.i_clusters)
    }

    /// 设置占用的簇数
    pub fn set_clusters(&mut self, clusters: u32) {
        self.inner.i_clusters = clusters.to_le();
    }

    /// 获取所属分配器槽位
    pub fn suballoc_slot(&self) -> u16 {
        self.inner.suballoc_slot()
    }

    /// 设置所属分配器槽位
    pub fn set_suballoc_slot(&mut self, slot: u16) {
        self.inner.i_suballoc_slot = slot.to_le();
    }

    /// 获取（分配器）总位数
    pub fn bitmap_total(&self) -> u32 {
        u32::from_le(self.inner.i_bitmap_total)
    }

    /// 设置（分配器）总位数
    pub fn set_bitmap_total(&mut self, total: u32) {
        self.inner.i_bitmap_total = total.to_le();
    }

    /// 获取（分配器）已用位数
    pub fn bitmap_used(&self) -> u32 {
        u32::from_le(self.inner.i_bitmap_used)
    }

    /// 设置（分配器）已用位数
    pub fn set_bitmap_used(&mut self, used: u32) {
        self.inner.i_bitmap_used = used.to_le();
    }

    /// 解码链表（要求 CHAIN 标志）
    pub fn chain_list(&self) -> Result<ChainList> {
        if !self.is_chain() {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "inode is not a chain allocator",
            ));
        }
        ChainList::decode(&self.buf)
    }

    /// 把链表编码回缓冲
    pub fn set_chain_list(&mut self, cl: &ChainList) {
        cl.encode(&mut self.buf);
    }

    /// 解码 extent 表（链式分配器没有 extent 表）
    pub fn extent_list(&self) -> Result<ExtentList> {
        if self.is_chain() {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "chain allocator inode has no extent list",
            ));
        }
        ExtentList::decode(&self.buf, CFS_INODE_LIST_OFFSET)
    }

    /// 把 extent 表编码回缓冲
    pub fn set_extent_list(&mut self, el: &ExtentList) {
        el.encode(&mut self.buf, CFS_INODE_LIST_OFFSET);
    }
}

impl core::fmt::Debug for Inode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inode")
            .field("blkno", &self.blkno())
            .field("flags", &self.inner.flags())
            .field("size", &self.size())
            .field("clusters", &self.clusters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::tests_support::MemDevice;
    use crate::types::{cfs_super_block, ChainRec, ExtentRec};
    use alloc::vec;

    fn sb(csum: bool) -> Superblock {
        let mut inner = cfs_super_block::default();
        inner.s_signature = *CFS_SUPER_SIGNATURE;
        inner.s_blocksize_bits = 9u32.to_le();
        let mut sb = Superblock::new(inner);
        if csum {
            sb.set_incompat_feature(CFS_FEATURE_INCOMPAT_META_CSUM);
        }
        sb
    }

    fn mk_inode(blkno: u64, flags: u32, ftype: u16, block_size: usize) -> Inode {
        let mut inner = cfs_dinode::default();
        inner.i_signature = *CFS_INODE_SIGNATURE;
        inner.i_blkno = blkno.to_le();
        inner.i_flags = flags.to_le();
        inner.i_ftype = ftype.to_le();
        Inode {
            inner,
            buf: vec![0u8; block_size],
        }
    }

    #[test]
    fn test_inode_roundtrip_plain() {
        let sb = sb(false);
        let mut bdev = BlockDev::new(MemDevice::new(16, 512)).unwrap();

        let mut ino = mk_inode(5, CFS_INODE_VALID_FL, CFS_FT_DIR as u16, 512);
        ino.set_size(1024);
        write_inode(&mut bdev, &sb, &mut ino).unwrap();

        let back = read_inode(&mut bdev, &sb, 5).unwrap();
        assert!(back.is_dir());
        assert_eq!(back.size(), 1024);
    }

    #[test]
    fn test_inode_roundtrip_with_csum() {
        let sb = sb(true);
        let mut bdev = BlockDev::new(MemDevice::new(16, 512)).unwrap();

        let mut ino = mk_inode(5, CFS_INODE_VALID_FL, CFS_FT_REG_FILE as u16, 512);
        write_inode(&mut bdev, &sb, &mut ino).unwrap();

        read_inode(&mut bdev, &sb, 5).unwrap();

        // 破坏一个字节后读取必须失败
        let mut raw = bdev.read_block_vec(5).unwrap();
        raw[100] ^= 1;
        bdev.write_block(5, &raw).unwrap();
        let err = read_inode(&mut bdev, &sb, 5).unwrap_err();
        assert_eq!(err.corrupt_kind(), Some(CorruptKind::BadChecksum));
    }

    #[test]
    fn test_inode_location_mismatch() {
        let sb = sb(false);
        let mut bdev = BlockDev::new(MemDevice::new(16, 512)).unwrap();

        let mut ino = mk_inode(5, CFS_INODE_VALID_FL, CFS_FT_REG_FILE as u16, 512);
        // 写到与 i_blkno 不一致的位置
        ino.inner.write_to(&mut ino.buf);
        bdev.write_block(6, &ino.buf).unwrap();

        assert!(read_inode(&mut bdev, &sb, 6).is_err());
    }

    #[test]
    fn test_chain_list_access() {
        let mut ino = mk_inode(3, CFS_INODE_VALID_FL | CFS_INODE_CHAIN_FL, 0, 512);
        let mut cl = ino.chain_list().unwrap();
        assert_eq!(cl.cl_next_free_rec, 0);

        cl.cl_count = 2;
        cl.cl_next_free_rec = 1;
        cl.cl_bpg = 64;
        cl.recs = vec![ChainRec { c_blkno: 99, c_total: 64, c_free: 8 }, ChainRec::default()];
        ino.set_chain_list(&cl);

        let back = ino.chain_list().unwrap();
        assert_eq!(back.recs[0].c_blkno, 99);
        assert_eq!(back.cl_bpg, 64);
    }

    #[test]
    fn test_extent_list_rejected_on_chain_inode() {
        let ino = mk_inode(3, CFS_INODE_VALID_FL | CFS_INODE_CHAIN_FL, 0, 512);
        assert!(ino.extent_list().is_err());
        let plain = mk_inode(4, CFS_INODE_VALID_FL, CFS_FT_DIR as u16, 512);
        assert!(plain.chain_list().is_err());
        assert!(plain.extent_list().is_ok());
    }

    #[test]
    fn test_extent_list_update() {
        let mut ino = mk_inode(4, CFS_INODE_VALID_FL, CFS_FT_DIR as u16, 512);
        let mut el = ino.extent_list().unwrap();
        el.l_count = ExtentList::capacity_for(512, CFS_INODE_LIST_OFFSET);
        el.l_next_free_rec = 1;
        el.recs.push(ExtentRec { e_blkno: 40, e_cpos: 0, e_blocks: 2 });
        ino.set_extent_list(&el);

        let back = ino.extent_list().unwrap();
        assert_eq!(back.recs.len(), 1);
        assert_eq!(back.recs[0].e_blkno, 40);
    }
}
