//! 链式分配器操作
//!
//! 一个分配器 inode 管理若干条链，每条链是组描述符经
//! `bg_next_group` 串成的单向链表。本模块提供链遍历、
//! 块分配、一致性校验和分配组迁移。

mod alloc;
mod migrate;
mod validate;

pub use self::alloc::{alloc_blocks, free_clusters};
pub use migrate::{relink_allocator, SubAllocKind};
pub use validate::{validate_allocator, validate_chain_group};

use crate::block::{BlockDev, BlockDevice};
use crate::error::{CorruptKind, Error, Result};
use crate::group::read_group_desc;
use crate::inode::Inode;
use crate::superblock::Superblock;

/// 遍历一个分配器的所有组
///
/// 对每条链上的每个组调用一次 `func`，调用发生在读取该组之前，
/// 读到组描述符后做位置和链下标的一致性检查，失败立即终止。
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock 引用
/// * `alloc` - 分配器 inode
/// * `func` - 回调 `(bdev, 组块号, 链下标)`
pub fn chain_iterate<D: BlockDevice, F>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    alloc: &Inode,
    mut func: F,
) -> Result<()>
where
    F: FnMut(&mut BlockDev<D>, u64, u16) -> Result<()>,
{
    let cl = alloc.chain_list()?;

    for chain in 0..cl.cl_next_free_rec {
        let mut blkno = cl.recs[chain as usize].c_blkno;

        while blkno != 0 {
            func(bdev, blkno, chain)?;

            let gd = read_group_desc(bdev, sb, blkno)?;
            if gd.blkno() != blkno {
                log::error!(
                    "[CHAIN] allocator {}: group descriptor at {} claims block {}",
                    alloc.blkno(),
                    blkno,
                    gd.blkno()
                );
                return Err(Error::corrupt(
                    CorruptKind::BadSignature,
                    blkno,
                    "group descriptor block number does not match its location",
                ));
            }
            if gd.chain() != chain {
                log::error!(
                    "[CHAIN] allocator {}: group at {} found on chain {} but claims chain {}",
                    alloc.blkno(),
                    blkno,
                    chain,
                    gd.chain()
                );
                return Err(Error::corrupt(
                    CorruptKind::GroupChainMismatch,
                    blkno,
                    "group descriptor chain index does not match the chain it is on",
                ));
            }

            blkno = gd.next_group();
        }
    }

    Ok(())
}
