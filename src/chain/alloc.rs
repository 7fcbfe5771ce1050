//! 从链式分配器分配块
//!
//! 目录扩展需要的新块从全局位图分配器取。分配只设置位并同步
//! 三级计数（组、链记录、分配器 inode），不做任何就近优化。

use crate::bitmap;
use crate::block::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use crate::group::{read_group_desc, write_group_desc};
use crate::inode::{write_inode, Inode};
use crate::superblock::Superblock;
use alloc::vec::Vec;

/// 分配器当前的空闲位数
pub fn free_clusters(alloc: &Inode) -> u32 {
    alloc.bitmap_total().saturating_sub(alloc.bitmap_used())
}

/// 从分配器分配 `count` 个块
///
/// 逐链扫描有空闲位的组，找到空闲位就占用。每占用一位立即
/// 写回组描述符，全部占完后写回分配器 inode。空闲位不足时
/// 返回 `NoSpace`，此时不会有任何写发生（调用前先做过空间
/// 预检）。
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock 引用
/// * `alloc` - 分配器 inode（全局位图）
/// * `count` - 要分配的块数
///
/// # 返回
///
/// 分配到的块号列表，长度恰为 `count`
pub fn alloc_blocks<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    alloc: &mut Inode,
    count: u64,
) -> Result<Vec<u64>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if (free_clusters(alloc) as u64) < count {
        return Err(Error::new(
            ErrorKind::NoSpace,
            "allocator does not have enough free bits",
        ));
    }

    let mut cl = alloc.chain_list()?;
    let mut picked: Vec<u64> = Vec::with_capacity(count as usize);
    let mut remaining = count;

    'chains: for chain in 0..cl.cl_next_free_rec as usize {
        let mut gd_blkno = cl.recs[chain].c_blkno;

        while gd_blkno != 0 && remaining > 0 {
            let mut gd = read_group_desc(bdev, sb, gd_blkno)?;
            let next = gd.next_group();

            let mut allocated_here = 0u32;
            while remaining > 0 && gd.free_bits() > 0 {
                let bits = gd.bits() as u32;
                let bit = bitmap::find_next_zero(gd.bitmap(), bits, 0);
                if bit >= bits {
                    // 计数说有空闲但位图找不到，留给校验器去报
                    break;
                }
                gd.alloc_bit(bit)?;
                picked.push(gd.block_of_bit(bit));
                allocated_here += 1;
                remaining -= 1;
            }

            if allocated_here > 0 {
                write_group_desc(bdev, sb, &mut gd)?;
                cl.recs[chain].c_free -= allocated_here;
                log::debug!(
                    "[ALLOC] {} bits from group {} (chain {})",
                    allocated_here,
                    gd_blkno,
                    chain
                );
            }

            if remaining == 0 {
                break 'chains;
            }
            gd_blkno = next;
        }
    }

    if remaining > 0 {
        // 计数与位图脱节也按空间不足上报，细节由校验器诊断
        return Err(Error::new(
            ErrorKind::NoSpace,
            "allocator free count disagrees with its bitmaps",
        ));
    }

    alloc.set_chain_list(&cl);
    alloc.set_bitmap_used(alloc.bitmap_used() + count as u32);
    write_inode(bdev, sb, alloc)?;

    Ok(picked)
}
