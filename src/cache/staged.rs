//! 暂存块

use crate::block::{BlockDev, BlockDevice};
use crate::error::Result;
use crate::superblock::Superblock;
use alloc::vec::Vec;

/// 暂存块的类型，决定下刷时用哪个写回例程
///
/// 类型是封闭的一小组，用枚举分派。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Inode 块
    Inode,
    /// Extent 块
    ExtentBlock,
    /// 组描述符块
    GroupDesc,
    /// 目录数据块
    DirBlock,
}

/// 一个暂存的元数据块
///
/// 扫描第一次碰到块时创建，之后的改动都落在 `buf` 上，
/// 下刷成功后随缓存一起销毁。
pub struct StagedBlock {
    /// 块号
    pub blkno: u64,
    /// 块类型
    pub kind: BlockKind,
    /// 暂存的整块数据
    pub buf: Vec<u8>,
}

impl StagedBlock {
    /// 调用本块类型对应的写回例程
    pub fn write_back<D: BlockDevice>(
        &mut self,
        bdev: &mut BlockDev<D>,
        sb: &Superblock,
    ) -> Result<()> {
        match self.kind {
            BlockKind::Inode => crate::inode::write_inode_raw(bdev, sb, self.blkno, &mut self.buf),
            BlockKind::ExtentBlock => {
                crate::extent::write_extent_block_raw(bdev, sb, self.blkno, &mut self.buf)
            }
            BlockKind::GroupDesc => {
                crate::group::write_group_desc_raw(bdev, sb, self.blkno, &mut self.buf)
            }
            BlockKind::DirBlock => {
                crate::dir::write_dir_block_raw(bdev, sb, self.blkno, &mut self.buf)
            }
        }
    }
}

impl core::fmt::Debug for StagedBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StagedBlock")
            .field("blkno", &self.blkno)
            .field("kind", &self.kind)
            .field("len", &self.buf.len())
            .finish()
    }
}
