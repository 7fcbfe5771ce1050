//! cfstune_core: 共享盘集群文件系统的在盘特性变更引擎
//!
//! 在不重新格式化的前提下改写持久化元数据布局：开关可选的在盘
//! 特性、增减每节点的分配槽位。调用方全程持有集群级排它锁，
//! 引擎单线程同步运行，唯一的阻塞点是块 I/O。
//!
//! 核心部件：
//! - **写缓存**（[`cache`]）：按块号有序、去重的暂存区，一趟
//!   批量下刷多种元数据块
//! - **目录尾部安装**（[`dir`]）：字节精确地搬迁目录项，给每个
//!   目录块腾出固定偏移的尾部结构
//! - **链迁移**（[`chain`]）：槽位收缩时把整个分配组在分配器
//!   之间移交
//! - **一致性校验**（[`chain::validate_allocator`]）：以上两者
//!   共同的前置/后置条件
//!
//! # 示例
//!
//! ```rust,ignore
//! use cfstune_core::{OpenFlags, TuneSession, enable_metadata_csum};
//!
//! // 实现 BlockDevice trait 的设备，锁已在外面拿好
//! let mut session = TuneSession::open(device, OpenFlags::RW | OpenFlags::ALLOCATION)?;
//! enable_metadata_csum(&mut session)?;
//! session.close()?;
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象和 I/O 操作
//! - [`consts`] - 常量定义
//! - [`types`] - 磁盘数据结构定义
//! - [`superblock`] - Superblock 操作
//! - [`session`] - 调优会话
//! - [`ops`] - 特性变更操作

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 磁盘数据结构定义
pub mod types;

/// Superblock 操作
pub mod superblock;

/// Inode 操作
pub mod inode;

/// 分配组描述符操作
pub mod group;

/// Extent 映射操作
pub mod extent;

/// 目录操作
pub mod dir;

/// 链式分配器：遍历、分配、校验、迁移
pub mod chain;

/// 写回暂存缓存
pub mod cache;

/// 位图操作
pub mod bitmap;

/// 调优会话
pub mod session;

/// 特性变更操作
pub mod ops;

/// 元数据块校验和
pub(crate) mod crc;

/// 测试卷构造
#[cfg(test)]
pub(crate) mod testfs;

// ===== 公共导出 =====

// 错误处理
pub use error::{CorruptKind, Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDev, BlockDevice};

// Superblock
pub use superblock::{read_superblock, write_superblock, Superblock};

// Inode
pub use inode::{read_inode, write_inode, Inode};

// 分配组
pub use group::{read_group_desc, write_group_desc, GroupDesc};

// Extent
pub use extent::{read_extent_block, write_extent_block, ExtentBlock};

// 链式分配器
pub use chain::{
    chain_iterate, relink_allocator, validate_allocator, validate_chain_group, SubAllocKind,
};

// 写缓存
pub use cache::{BlockKind, StagedBlock, WriteCache};

// 目录
pub use dir::{
    dir_trailer_blk_off, install_dir_trailer, prepare_dir_trailer, DirEntryCursor, TrailerContext,
};

// 会话
pub use session::{CriticalGuard, OpenFlags, TuneSession};

// 操作
pub use ops::{change_slot_count, disable_metadata_csum, enable_metadata_csum};
