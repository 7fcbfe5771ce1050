//! 块设备核心类型

use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use lru::LruCache;

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。块 I/O 是引擎唯一的阻塞点，
/// 集群锁、成员管理都在调用方。
///
/// # 示例
///
/// ```rust,ignore
/// use cfstune_core::{BlockDevice, Result};
///
/// struct MyDevice {
///     // ...
/// }
///
/// impl BlockDevice for MyDevice {
///     fn block_size(&self) -> u32 {
///         4096
///     }
///
///     fn total_blocks(&self) -> u64 {
///         1000000
///     }
///
///     fn read_block(&mut self, blkno: u64, buf: &mut [u8]) -> Result<()> {
///         // 实现块读取
///         Ok(())
///     }
///
///     fn write_block(&mut self, blkno: u64, buf: &[u8]) -> Result<()> {
///         // 实现块写入
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 逻辑块大小（字节）
    fn block_size(&self) -> u32;

    /// 总块数
    fn total_blocks(&self) -> u64;

    /// 读取一个块
    ///
    /// # 参数
    ///
    /// * `blkno` - 块号
    /// * `buf` - 目标缓冲区（大小恰为 block_size）
    fn read_block(&mut self, blkno: u64, buf: &mut [u8]) -> Result<()>;

    /// 写入一个块
    ///
    /// # 参数
    ///
    /// * `blkno` - 块号
    /// * `buf` - 源缓冲区（大小恰为 block_size）
    fn write_block(&mut self, blkno: u64, buf: &[u8]) -> Result<()>;

    /// 刷新设备缓存
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

/// 默认的扫描读缓存容量（块数）
pub const DEFAULT_READ_CACHE: usize = 64;

/// 全卷扫描时的读缓存容量（块数）
pub const LARGE_READ_CACHE: usize = 4096;

/// 块设备包装器
///
/// 持有底层设备、一个可选的 LRU 读缓存和 I/O 统计。
/// 读缓存只服务于整卷扫描类操作，不缓存脏数据。
pub struct BlockDev<D> {
    /// 底层设备
    device: D,
    /// 逻辑读取次数（包括缓存命中）
    read_count: u64,
    /// 物理读取次数（实际设备操作）
    physical_read_count: u64,
    /// 写入次数
    write_count: u64,
    /// 扫描读缓存
    pub(super) rcache: Option<LruCache<u64, Vec<u8>>>,
}

impl<D: BlockDevice> BlockDev<D> {
    /// 创建新的块设备包装器（无缓存）
    pub fn new(device: D) -> Result<Self> {
        let block_size = device.block_size();
        if !block_size.is_power_of_two() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block size must be a power of two",
            ));
        }

        Ok(Self {
            device,
            read_count: 0,
            physical_read_count: 0,
            write_count: 0,
            rcache: None,
        })
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 拆掉包装器，取回底层设备
    pub fn into_device(self) -> D {
        self.device
    }

    /// 获取逻辑块大小
    pub fn block_size(&self) -> u32 {
        self.device.block_size()
    }

    /// 获取总块数
    pub fn total_blocks(&self) -> u64 {
        self.device.total_blocks()
    }

    /// 获取逻辑读取次数（包括缓存命中）
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 获取物理读取次数（实际设备操作）
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count
    }

    /// 获取写入次数
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// 启用扫描读缓存
    ///
    /// # 参数
    ///
    /// * `capacity` - 缓存容量（块数）
    pub fn enable_read_cache(&mut self, capacity: usize) {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        log::debug!("[BLOCK] read cache enabled, {} blocks", capacity);
        self.rcache = Some(LruCache::new(capacity));
    }

    /// 丢弃扫描读缓存
    pub fn drop_read_cache(&mut self) {
        if self.rcache.take().is_some() {
            log::debug!("[BLOCK] read cache dropped");
        }
    }

    /// 是否启用了读缓存
    pub fn has_read_cache(&self) -> bool {
        self.rcache.is_some()
    }

    pub(super) fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    pub(super) fn inc_physical_read_count(&mut self) {
        self.physical_read_count += 1;
    }

    pub(super) fn inc_write_count(&mut self) {
        self.write_count += 1;
    }
}

impl<D> core::fmt::Debug for BlockDev<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockDev")
            .field("read_count", &self.read_count)
            .field("physical_read_count", &self.physical_read_count)
            .field("write_count", &self.write_count)
            .field("cached", &self.rcache.as_ref().map(|c| c.len()))
            .finish()
    }
}
