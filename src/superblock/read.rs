//! Superblock 读取和验证

use super::Superblock;
use crate::block::{BlockDev, BlockDevice};
use crate::consts::*;
use crate::crc::{verify_block, CFS_BLOCK_CHECK_OFFSET};
use crate::error::{CorruptKind, Error, ErrorKind, Result};
use crate::types::cfs_super_block;

/// 从块设备读取 superblock
///
/// 签名检查通过后，如果卷开启了元数据校验和，再校验整块。
///
/// # 参数
///
/// * `bdev` - 块设备引用
pub fn read_superblock<D: BlockDevice>(bdev: &mut BlockDev<D>) -> Result<Superblock> {
    let buf = bdev.read_block_vec(CFS_SUPER_BLKNO)?;

    let inner = cfs_super_block::from_block(&buf);
    if !inner.is_valid() {
        return Err(Error::corrupt(
            CorruptKind::BadSignature,
            CFS_SUPER_BLKNO,
            "invalid superblock signature",
        ));
    }

    let block_size = inner.block_size();
    if block_size < CFS_MIN_BLOCKSIZE || block_size > CFS_MAX_BLOCKSIZE {
        return Err(Error::new(ErrorKind::Unsupported, "unsupported block size"));
    }
    if block_size != bdev.block_size() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "device block size does not match volume",
        ));
    }

    let sb = Superblock::new(inner);
    if sb.meta_csum() {
        verify_block(&buf, CFS_BLOCK_CHECK_OFFSET, CFS_SUPER_BLKNO)?;
    }

    log::debug!(
        "[SUPER] volume opened: {} blocks of {} bytes, {} slots, incompat {:#x}",
        sb.total_blocks(),
        block_size,
        sb.max_slots(),
        u32::from_le(sb.inner().s_feature_incompat),
    );

    Ok(sb)
}
