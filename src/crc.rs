//! 元数据块校验和
//!
//! 校验和覆盖整个块，计算时把块内的校验和字段视为 0。
//! 只有卷开启了元数据校验和特性时才写入和校验。

use crate::error::{CorruptKind, Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// 除目录块尾部外，所有元数据块的校验和字段都在偏移 12 处
pub const CFS_BLOCK_CHECK_OFFSET: usize = 12;

/// 计算一个元数据块的校验和
///
/// # 参数
///
/// * `buf` - 整块数据
/// * `check_off` - 校验和字段在块内的偏移（计算时按 0 处理）
pub fn block_csum(buf: &[u8], check_off: usize) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..check_off]);
    hasher.update(&[0u8; 4]);
    hasher.update(&buf[check_off + 4..]);
    hasher.finalize()
}

/// 把校验和写进块内的校验和字段
pub fn seal_block(buf: &mut [u8], check_off: usize) {
    let csum = block_csum(buf, check_off);
    LittleEndian::write_u32(&mut buf[check_off..check_off + 4], csum);
}

/// 校验一个元数据块
///
/// 不匹配按结构损坏处理，错误携带块号。
pub fn verify_block(buf: &[u8], check_off: usize, blkno: u64) -> Result<()> {
    let stored = LittleEndian::read_u32(&buf[check_off..check_off + 4]);
    let computed = block_csum(buf, check_off);
    if stored != computed {
        log::error!(
            "[CSUM] block {} checksum mismatch: stored {:#010x}, computed {:#010x}",
            blkno,
            stored,
            computed
        );
        return Err(Error::corrupt(
            CorruptKind::BadChecksum,
            blkno,
            "metadata block checksum mismatch",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_seal_then_verify() {
        let mut buf = vec![0u8; 512];
        buf[100] = 0xab;
        seal_block(&mut buf, 12);
        verify_block(&buf, 12, 1).unwrap();
    }

    #[test]
    fn test_flipped_byte_fails() {
        let mut buf = vec![0u8; 512];
        buf[100] = 0xab;
        seal_block(&mut buf, 12);

        buf[200] ^= 0x01;
        let err = verify_block(&buf, 12, 77).unwrap_err();
        assert_eq!(err.corrupt_kind(), Some(CorruptKind::BadChecksum));
        assert_eq!(err.blkno(), Some(77));
    }

    #[test]
    fn test_check_field_itself_ignored() {
        let mut buf = vec![0u8; 512];
        seal_block(&mut buf, 12);
        let sealed = buf.clone();

        // 重新计算时字段本身不参与
        assert_eq!(block_csum(&buf, 12), block_csum(&sealed, 12));
    }
}
