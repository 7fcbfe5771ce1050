//! 位图/链一致性校验
//!
//! 只读校验，作为所有触碰分配器的变更的前置和后置条件。
//! 对每个分配器的每条链检查：
//!
//! 1. 组描述符记录的父分配器和链下标与所在链一致
//! 2. 扫描位图重算的空闲位数等于记录值
//! 3. 总位数不超过位图物理容量
//! 4. 空闲位数少于总位数
//! 5. 链记录的总数/空闲数等于链上各组之和
//!
//! 以及分配器级别的聚合：各链总数之和等于 inode 记录的总位数，
//! 各链空闲之和等于总位数减已用位数。
//!
//! 第一个失败的条件立即返回携带块号的损坏错误，不做修复。

use crate::block::{BlockDev, BlockDevice};
use crate::error::{CorruptKind, Error, Result};
use crate::group::read_group_desc;
use crate::inode::Inode;
use crate::superblock::Superblock;

/// 校验一个分配器的一条链
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock 引用
/// * `alloc` - 分配器 inode
/// * `chain` - 链下标
pub fn validate_chain_group<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    alloc: &Inode,
    chain: u16,
) -> Result<()> {
    let cl = alloc.chain_list()?;
    let cr = &cl.recs[chain as usize];

    let mut total: u32 = 0;
    let mut free: u32 = 0;
    let mut blkno = cr.c_blkno;

    while blkno != 0 {
        let gd = read_group_desc(bdev, sb, blkno)?;

        if gd.parent_blkno() != alloc.blkno() {
            log::error!(
                "[VALIDATE] allocator {}: group at {} says it belongs to allocator {}",
                alloc.blkno(),
                blkno,
                gd.parent_blkno()
            );
            return Err(Error::corrupt(
                CorruptKind::GroupParentMismatch,
                blkno,
                "group descriptor parent does not match the allocator it is on",
            ));
        }

        if gd.chain() != chain {
            log::error!(
                "[VALIDATE] allocator {}: group at {} found on chain {} but says chain {}",
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

        let bits = gd.count_free_bits();
        if bits != gd.free_bits() as u32 {
            log::error!(
                "[VALIDATE] allocator {}: group at {} has {} free bits but says {}",
                alloc.blkno(),
                blkno,
                bits,
                gd.free_bits()
            );
            return Err(Error::corrupt(
                CorruptKind::GroupFreeMismatch,
                blkno,
                "group free bit count does not match its bitmap",
            ));
        }

        if gd.bits() as u32 > gd.inner().bitmap_size() as u32 * 8 {
            log::error!(
                "[VALIDATE] allocator {}: group at {} can hold {} bits but claims {}",
                alloc.blkno(),
                blkno,
                gd.inner().bitmap_size() as u32 * 8,
                gd.bits()
            );
            return Err(Error::corrupt(
                CorruptKind::GroupBitsOverCapacity,
                blkno,
                "group claims more bits than its bitmap can hold",
            ));
        }

        if gd.free_bits() >= gd.bits() {
            log::error!(
                "[VALIDATE] allocator {}: group at {} claims more free bits than total",
                alloc.blkno(),
                blkno
            );
            return Err(Error::corrupt(
                CorruptKind::GroupFreeOverTotal,
                blkno,
                "group claims at least as many free bits as total bits",
            ));
        }

        total += gd.bits() as u32;
        free += gd.free_bits() as u32;
        blkno = gd.next_group();
    }

    if cr.c_total != total {
        log::error!(
            "[VALIDATE] allocator {}: chain {} holds {} total bits but says {}",
            alloc.blkno(),
            chain,
            total,
            cr.c_total
        );
        return Err(Error::corrupt(
            CorruptKind::ChainTotalMismatch,
            alloc.blkno(),
            "chain record total does not match the sum of its groups",
        ));
    }

    if cr.c_free != free {
        log::error!(
            "[VALIDATE] allocator {}: chain {} holds {} free bits but says {}",
            alloc.blkno(),
            chain,
            free,
            cr.c_free
        );
        return Err(Error::corrupt(
            CorruptKind::ChainFreeMismatch,
            alloc.blkno(),
            "chain record free count does not match the sum of its groups",
        ));
    }

    Ok(())
}

/// 校验一个分配器的全部链和聚合计数
pub fn validate_allocator<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    alloc: &Inode,
) -> Result<()> {
    log::debug!("[VALIDATE] allocator {}", alloc.blkno());

    let cl = alloc.chain_list()?;
    let mut total: u64 = 0;
    let mut free: u64 = 0;

    for chain in 0..cl.cl_next_free_rec {
        validate_chain_group(bdev, sb, alloc, chain)?;
        total += cl.recs[chain as usize].c_total as u64;
        free += cl.recs[chain as usize].c_free as u64;
    }

    if total != alloc.bitmap_total() as u64
        || free != (alloc.bitmap_total() - alloc.bitmap_used()) as u64
    {
        log::error!(
            "[VALIDATE] allocator {}: chains sum to {}/{} (total/free) but inode says {}/{}",
            alloc.blkno(),
            total,
            free,
            alloc.bitmap_total(),
            alloc.bitmap_total() - alloc.bitmap_used()
        );
        return Err(Error::corrupt(
            CorruptKind::AllocTotalMismatch,
            alloc.blkno(),
            "allocator counters do not match the sum of its chains",
        ));
    }

    Ok(())
}
