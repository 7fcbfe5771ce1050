//! 块 I/O 操作实现

use super::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;

impl<D: BlockDevice> BlockDev<D> {
    /// 读取单个逻辑块
    ///
    /// 如果启用了读缓存，优先从缓存读取；未命中则从设备读取并填充缓存。
    ///
    /// # 参数
    ///
    /// * `blkno` - 块号
    /// * `buf` - 目标缓冲区（大小至少为 block_size）
    pub fn read_block(&mut self, blkno: u64, buf: &mut [u8]) -> Result<()> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }
        if blkno >= self.total_blocks() {
            return Err(Error::new(ErrorKind::InvalidInput, "block number beyond device").with_blkno(blkno));
        }

        self.inc_read_count();

        if let Some(cache) = &mut self.rcache {
            if let Some(data) = cache.get(&blkno) {
                buf[..block_size].copy_from_slice(data);
                log::trace!("[BLOCK] read {} HIT", blkno);
                return Ok(());
            }
        }

        self.inc_physical_read_count();
        self.device_mut().read_block(blkno, &mut buf[..block_size])?;
        log::trace!("[BLOCK] read {} from device", blkno);

        if let Some(cache) = &mut self.rcache {
            cache.put(blkno, buf[..block_size].to_vec());
        }

        Ok(())
    }

    /// 读取单个逻辑块到新分配的缓冲
    pub fn read_block_vec(&mut self, blkno: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size() as usize];
        self.read_block(blkno, &mut buf)?;
        Ok(buf)
    }

    /// 写入单个逻辑块
    ///
    /// 写穿：先写设备，成功后更新缓存中已有的副本。
    ///
    /// # 参数
    ///
    /// * `blkno` - 块号
    /// * `buf` - 源缓冲区（大小至少为 block_size）
    pub fn write_block(&mut self, blkno: u64, buf: &[u8]) -> Result<()> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }
        if blkno >= self.total_blocks() {
            return Err(Error::new(ErrorKind::InvalidInput, "block number beyond device").with_blkno(blkno));
        }
        if self.device().is_read_only() {
            return Err(Error::new(ErrorKind::ReadOnly, "device is read-only"));
        }

        self.inc_write_count();
        self.device_mut().write_block(blkno, &buf[..block_size])?;
        log::trace!("[BLOCK] write {}", blkno);

        if let Some(cache) = &mut self.rcache {
            if cache.contains(&blkno) {
                cache.put(blkno, buf[..block_size].to_vec());
            }
        }

        Ok(())
    }
}
