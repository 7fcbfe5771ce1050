//! 调优会话
//!
//! 一次调优操作的全部状态：块设备、superblock 副本、打开标志和
//! 调用方提供的临界区钩子。会话在卷打开时创建、关闭时销毁，
//! 不同会话之间不共享任何状态。
//!
//! 引擎自己不碰信号。多个相关写组成的序列（目录尾部提交、链
//! 迁移、特性位切换）都包在 [`TuneSession::critical`] 里执行，
//! 钩子的实现方负责屏蔽操作员中断。临界区之间可以取消，临界区
//! 内部不行。

use crate::block::{BlockDev, BlockDevice, DEFAULT_READ_CACHE, LARGE_READ_CACHE};
use crate::chain::validate_allocator;
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{read_inode, Inode};
use crate::superblock::{read_superblock, write_superblock, Superblock};
use crate::types::SystemTableEntry;
use alloc::boxed::Box;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 卷打开标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// 读写打开
        const RW = 0x01;
        /// 操作会触碰分配器：打开和关闭时跑一致性校验
        const ALLOCATION = 0x02;
        /// 整卷扫描类操作：用大的读缓存
        const LARGE_CACHE = 0x04;
    }
}

/// 临界区钩子
///
/// `begin`/`end` 包住每一段多写序列。调用方通常在这里屏蔽和
/// 恢复操作员信号。
pub trait CriticalGuard {
    /// 进入临界区
    fn begin(&mut self);
    /// 离开临界区
    fn end(&mut self);
}

/// 一次调优操作的会话
pub struct TuneSession<D: BlockDevice> {
    bdev: BlockDev<D>,
    sb: Superblock,
    flags: OpenFlags,
    guard: Option<Box<dyn CriticalGuard>>,
}

impl<D: BlockDevice> TuneSession<D> {
    /// 打开卷，创建会话
    ///
    /// 调用方必须已经持有集群级排它锁。带 `ALLOCATION` 标志时
    /// 先对所有分配器跑一遍一致性校验，脏卷直接拒绝打开。
    pub fn open(device: D, flags: OpenFlags) -> Result<Self> {
        let mut bdev = BlockDev::new(device)?;
        if flags.contains(OpenFlags::RW) && bdev.device().is_read_only() {
            return Err(Error::new(ErrorKind::ReadOnly, "device is read-only"));
        }

        bdev.enable_read_cache(if flags.contains(OpenFlags::LARGE_CACHE) {
            LARGE_READ_CACHE
        } else {
            DEFAULT_READ_CACHE
        });

        let sb = read_superblock(&mut bdev)?;
        let mut session = Self {
            bdev,
            sb,
            flags,
            guard: None,
        };

        if flags.contains(OpenFlags::ALLOCATION) {
            session.validate_volume()?;
        }

        Ok(session)
    }

    /// 关闭会话
    ///
    /// 带 `ALLOCATION` 标志时重跑一致性校验，作为整个操作的
    /// 后置条件。
    pub fn close(mut self) -> Result<()> {
        if self.flags.contains(OpenFlags::ALLOCATION) {
            self.validate_volume()?;
        }
        self.bdev.device_mut().flush()
    }

    /// 设置临界区钩子
    pub fn set_critical_guard(&mut self, guard: Box<dyn CriticalGuard>) {
        self.guard = Some(guard);
    }

    /// 在临界区里执行一段多写序列
    pub fn critical<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let mut guard = self.guard.take();
        if let Some(g) = guard.as_mut() {
            g.begin();
        }
        let ret = f(self);
        if let Some(g) = guard.as_mut() {
            g.end();
        }
        self.guard = guard;
        ret
    }

    /// 获取 superblock
    pub fn sb(&self) -> &Superblock {
        &self.sb
    }

    /// 获取 superblock（可变）
    pub fn sb_mut(&mut self) -> &mut Superblock {
        &mut self.sb
    }

    /// 获取块设备
    pub fn bdev_mut(&mut self) -> &mut BlockDev<D> {
        &mut self.bdev
    }

    /// 同时借出块设备和 superblock
    ///
    /// 大多数底层例程需要 `(&mut BlockDev, &Superblock)` 这对参数。
    pub fn parts(&mut self) -> (&mut BlockDev<D>, &Superblock) {
        (&mut self.bdev, &self.sb)
    }

    /// 把内存里的 superblock 写回块 0
    pub fn write_super(&mut self) -> Result<()> {
        write_superblock(&mut self.bdev, &self.sb)
    }

    /// 在临界区里设置一个调优进行中标志并落盘
    pub fn set_in_progress(&mut self, flag: u16) -> Result<()> {
        self.critical(|s| {
            s.sb.set_tunefs_flag(flag);
            s.write_super()
        })
    }

    /// 在临界区里清除一个调优进行中标志并落盘
    pub fn clear_in_progress(&mut self, flag: u16) -> Result<()> {
        self.critical(|s| {
            s.sb.clear_tunefs_flag(flag);
            s.write_super()
        })
    }

    /// 读系统表
    pub fn system_table(&mut self) -> Result<Vec<SystemTableEntry>> {
        let blkno = self.sb.system_table_blkno();
        let buf = self.bdev.read_block_vec(blkno)?;
        SystemTableEntry::decode_all(&buf)
    }

    /// 查找一个系统 inode 的块号
    ///
    /// # 参数
    ///
    /// * `kind` - 系统 inode 类型（见 `CFS_SYS_*`）
    /// * `slot` - 槽位（无槽位的类型传 0）
    pub fn lookup_system_inode(&mut self, kind: u16, slot: u16) -> Result<u64> {
        let entries = self.system_table()?;
        for e in &entries {
            if e.e_type == kind && e.e_slot == slot && e.e_blkno != 0 {
                return Ok(e.e_blkno);
            }
        }
        Err(Error::new(ErrorKind::NotFound, "system inode not in the system table"))
    }

    /// 读全局位图分配器 inode
    pub fn global_bitmap(&mut self) -> Result<Inode> {
        let blkno = self.lookup_system_inode(CFS_SYS_GLOBAL_BITMAP, 0)?;
        read_inode(&mut self.bdev, &self.sb, blkno)
    }

    /// 当前可用的空闲簇数
    pub fn free_clusters(&mut self) -> Result<u32> {
        let bm = self.global_bitmap()?;
        Ok(crate::chain::free_clusters(&bm))
    }

    /// 对卷上所有分配器跑一致性校验
    ///
    /// 已裁撤槽位的分配器留在系统表里，内容为空，照样校验。
    pub fn validate_volume(&mut self) -> Result<()> {
        log::debug!("[VALIDATE] checking every allocator on the volume");
        let entries = self.system_table()?;
        for e in entries {
            if e.e_blkno == 0 {
                continue;
            }
            match e.e_type {
                CFS_SYS_GLOBAL_BITMAP | CFS_SYS_EXTENT_ALLOC | CFS_SYS_INODE_ALLOC => {
                    let ino = read_inode(&mut self.bdev, &self.sb, e.e_blkno)?;
                    validate_allocator(&mut self.bdev, &self.sb, &ino)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// 收集卷上所有普通 inode 的块号
    ///
    /// 走每个槽位的 inode 分配器，组位图里每个占用位（除位 0，
    /// 即组描述符自身）就是一个 inode。
    pub fn collect_inode_blocks(&mut self) -> Result<Vec<u64>> {
        let mut blocks = Vec::new();

        for slot in 0..self.sb.max_slots() {
            let alloc_blkno = self.lookup_system_inode(CFS_SYS_INODE_ALLOC, slot)?;
            let alloc = read_inode(&mut self.bdev, &self.sb, alloc_blkno)?;

            let mut group_blocks = Vec::new();
            crate::chain::chain_iterate(&mut self.bdev, &self.sb, &alloc, |_bdev, gd_blkno, _chain| {
                group_blocks.push(gd_blkno);
                Ok(())
            })?;

            for gd_blkno in group_blocks {
                let gd = crate::group::read_group_desc(&mut self.bdev, &self.sb, gd_blkno)?;
                let bits = gd.bits() as u32;
                for bit in 1..bits {
                    if gd.bit_set(bit) {
                        blocks.push(gd.block_of_bit(bit));
                    }
                }
            }
        }

        Ok(blocks)
    }
}

impl<D: BlockDevice> core::fmt::Debug for TuneSession<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TuneSession")
            .field("flags", &self.flags)
            .field("slots", &self.sb.max_slots())
            .finish()
    }
}
