//! 目录块读写和尾部结构

use crate::block::{BlockDev, BlockDevice};
use crate::consts::*;
use crate::crc::{seal_block, verify_block};
use crate::error::{CorruptKind, Error, Result};
use crate::superblock::Superblock;
use crate::types::cfs_dir_trailer;
use alloc::vec::Vec;

/// 目录块尾部结构在块内的偏移
///
/// 只由块大小决定，必须与读这个卷的驱动完全一致。
#[inline]
pub const fn dir_trailer_blk_off(block_size: usize) -> usize {
    block_size - CFS_DIR_TRAILER_SIZE
}

/// 尾部结构里校验和字段在块内的偏移
#[inline]
pub const fn dir_trailer_check_off(block_size: usize) -> usize {
    dir_trailer_blk_off(block_size) + 24
}

/// 这个卷的目录块是否带尾部结构
pub fn dir_has_trailer(sb: &Superblock) -> bool {
    sb.supports_dir_trailer()
}

/// 在目录块缓冲里初始化尾部结构
///
/// 兼容字段伪装成一个跨度 64 的死目录项。`free_rec_len` 记录
/// 块内最大空闲跨度，由调用方算好传入。
pub fn init_dir_trailer(buf: &mut [u8], blkno: u64, parent_blkno: u64, free_rec_len: u16) {
    let toff = dir_trailer_blk_off(buf.len());
    let mut trailer = cfs_dir_trailer::default();
    trailer.db_compat_rec_len = (CFS_DIR_TRAILER_SIZE as u16).to_le();
    trailer.db_signature = *CFS_DIR_TRAILER_SIGNATURE;
    trailer.db_blkno = blkno.to_le();
    trailer.db_parent_dinode = parent_blkno.to_le();
    trailer.db_free_rec_len = free_rec_len.to_le();
    trailer.write_to(buf, toff);
}

/// 块尾部是否已经有合法的尾部结构
pub fn block_has_trailer(buf: &[u8], blkno: u64) -> bool {
    let toff = dir_trailer_blk_off(buf.len());
    let trailer = cfs_dir_trailer::from_block(buf, toff);
    trailer.is_valid()
        && u64::from_le(trailer.db_compat_inode) == 0
        && u16::from_le(trailer.db_compat_rec_len) == CFS_DIR_TRAILER_SIZE as u16
        && u64::from_le(trailer.db_blkno) == blkno
}

/// 读取一个目录数据块
///
/// 卷要求尾部结构时校验尾部签名，并在开启元数据校验和时校验
/// 整块。
pub fn read_dir_block<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
) -> Result<Vec<u8>> {
    let buf = bdev.read_block_vec(blkno)?;

    if dir_has_trailer(sb) {
        if sb.meta_csum() {
            verify_block(&buf, dir_trailer_check_off(buf.len()), blkno)?;
        }
        if !block_has_trailer(&buf, blkno) {
            return Err(Error::corrupt(
                CorruptKind::BadSignature,
                blkno,
                "directory block is missing its trailer",
            ));
        }
    }

    Ok(buf)
}

/// 把一个目录数据块写回设备（写缓存的目录块写回例程）
///
/// 开启元数据校验和时把校验和写进尾部结构。
pub fn write_dir_block_raw<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
    buf: &mut [u8],
) -> Result<()> {
    if sb.meta_csum() {
        seal_block(buf, dir_trailer_check_off(buf.len()));
    }
    log::trace!("[DIR] write {}", blkno);
    bdev.write_block(blkno, buf)
}
