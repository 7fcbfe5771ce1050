//! Superblock 写入

use super::Superblock;
use crate::block::{BlockDev, BlockDevice};
use crate::consts::CFS_SUPER_BLKNO;
use crate::crc::{seal_block, CFS_BLOCK_CHECK_OFFSET};
use crate::error::Result;
use alloc::vec;

/// 把 superblock 写回块 0
///
/// 卷开启元数据校验和时先重算校验和再写入。
/// 调用方负责把这次写放在临界区里。
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock
pub fn write_superblock<D: BlockDevice>(bdev: &mut BlockDev<D>, sb: &Superblock) -> Result<()> {
    let mut buf = vec![0u8; bdev.block_size() as usize];
    sb.inner().write_to(&mut buf);

    if sb.meta_csum() {
        seal_block(&mut buf, CFS_BLOCK_CHECK_OFFSET);
    }

    log::debug!("[SUPER] writing superblock");
    bdev.write_block(CFS_SUPER_BLKNO, &buf)
}
