//! 写回暂存缓存
//!
//! 批量改写操作把所有要重写的元数据块按块号暂存在这里，
//! 最后一次性下刷。一个块在一趟扫描里只能被发现一次，第二次
//! 插入是内部前置条件错误；扫描途中再碰到同一块时用
//! [`WriteCache::lookup_mut`] 取回暂存副本继续改，保证改动
//! 不会互相覆盖。
//!
//! 下刷按块号升序进行。顺序对正确性是任意的（暂存块之间
//! 互相独立），但升序让下刷行为确定、可调试。第一个 I/O
//! 失败立即停止，之后的块保持未写状态。

mod staged;

pub use staged::{BlockKind, StagedBlock};

use crate::block::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use crate::superblock::Superblock;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// 写回暂存缓存
///
/// 条目归属于创建它的那次操作，成功和失败路径都以
/// [`WriteCache::clear`] 收尾，不跨操作保留。
#[derive(Default)]
pub struct WriteCache {
    blocks: BTreeMap<u64, StagedBlock>,
}

impl WriteCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂存块数量
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 查找已暂存的块
    pub fn lookup(&self, blkno: u64) -> Option<&StagedBlock> {
        self.blocks.get(&blkno)
    }

    /// 查找已暂存的块（可变）
    pub fn lookup_mut(&mut self, blkno: u64) -> Option<&mut StagedBlock> {
        self.blocks.get_mut(&blkno)
    }

    /// 暂存一个块
    ///
    /// 每个块在一趟扫描里必须恰好被发现一次，重复插入说明
    /// 扫描逻辑出了问题，按内部错误处理。
    pub fn insert(&mut self, blkno: u64, buf: Vec<u8>, kind: BlockKind) -> Result<()> {
        if self.blocks.contains_key(&blkno) {
            log::error!("[CACHE] block {} staged twice", blkno);
            return Err(Error::new(
                ErrorKind::Internal,
                "metadata block staged twice in one pass",
            ).with_blkno(blkno));
        }

        log::trace!("[CACHE] stage {} as {:?}", blkno, kind);
        self.blocks.insert(blkno, StagedBlock { blkno, kind, buf });
        Ok(())
    }

    /// 按块号升序迭代暂存块
    pub fn iter(&self) -> impl Iterator<Item = &StagedBlock> {
        self.blocks.values()
    }

    /// 把所有暂存块下刷到设备
    ///
    /// 按块号升序逐个调用块类型对应的写回例程，第一个失败
    /// 立即返回，之后的块保持未写。
    pub fn flush<D: BlockDevice>(
        &mut self,
        bdev: &mut BlockDev<D>,
        sb: &Superblock,
    ) -> Result<()> {
        log::debug!("[CACHE] flushing {} staged blocks", self.blocks.len());

        for block in self.blocks.values_mut() {
            log::trace!("[CACHE] flush {} ({:?})", block.blkno, block.kind);
            block.write_back(bdev, sb)?;
        }

        Ok(())
    }

    /// 释放全部条目
    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

impl core::fmt::Debug for WriteCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WriteCache")
            .field("staged", &self.blocks.len())
            .finish()
    }
}
