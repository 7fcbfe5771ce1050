//! 磁盘数据结构定义
//!
//! 这个模块包含了直接对应磁盘格式的数据结构。
//!
//! ## 设计原则
//!
//! 1. **磁盘格式结构** - 保留 C 风格命名（便于对照格式文档）
//! 2. **内存表示** - 使用 `#[repr(C)]`，字段全部按小端存放，布局自然对齐无填充
//! 3. **变长区域** - 链表/extent 表和目录项为变长结构，使用 `byteorder`
//!    在字节缓冲上编解码，解码结果是自有集合（`Vec`），不做指针链接

#![allow(non_camel_case_types)] // 允许C风格命名

use crate::consts::*;
use crate::error::{CorruptKind, Error, ErrorKind, Result};
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

// ===== 各结构内的固定偏移 =====

/// inode 块中链表/extent 表的起始偏移
pub const CFS_INODE_LIST_OFFSET: usize = 64;
/// extent 块中 extent 表的起始偏移
pub const CFS_EXTENT_LIST_OFFSET: usize = 32;
/// 组描述符头部大小（其后是位图）
pub const CFS_GROUP_HEADER_SIZE: usize = 48;
/// 系统表头部大小（其后是表项）
pub const CFS_SYSTAB_HEADER_SIZE: usize = 24;
/// 链记录 / extent 记录的大小
pub const CFS_LIST_REC_SIZE: usize = 16;
/// 表（链表或 extent 表）头部大小
pub const CFS_LIST_HEADER_SIZE: usize = 8;
/// 系统表项大小
pub const CFS_SYSTAB_ENTRY_SIZE: usize = 16;

//=============================================================================
// Superblock
//=============================================================================

/// Superblock 结构
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct cfs_super_block {
    pub s_signature: [u8; 8],        // 0: 签名
    pub s_generation: u32,           // 8: 卷代数
    pub s_check: u32,                // 12: 校验和
    pub s_total_blocks: u64,         // 16: 总块数
    pub s_root_blkno: u64,           // 24: 根目录 inode 块号
    pub s_system_table_blkno: u64,   // 32: 系统表块号
    pub s_blocksize_bits: u32,       // 40: 块大小（2^bits）
    pub s_feature_compat: u32,       // 44: 兼容特性
    pub s_feature_incompat: u32,     // 48: 不兼容特性
    pub s_tunefs_flag: u16,          // 52: 调优进行中标志
    pub s_max_slots: u16,            // 54: 槽位数
    pub s_label: [u8; 64],           // 56: 卷标
}

impl Default for cfs_super_block {
    fn default() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

impl cfs_super_block {
    /// 检查签名
    pub fn is_valid(&self) -> bool {
        &self.s_signature == CFS_SUPER_SIGNATURE
    }

    /// 获取块大小（字节）
    pub fn block_size(&self) -> u32 {
        1 << u32::from_le(self.s_blocksize_bits)
    }

    /// 获取总块数
    pub fn total_blocks(&self) -> u64 {
        u64::from_le(self.s_total_blocks)
    }

    /// 获取槽位数
    pub fn max_slots(&self) -> u16 {
        u16::from_le(self.s_max_slots)
    }

    /// 从块缓冲解析
    pub fn from_block(buf: &[u8]) -> Self {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }

    /// 序列化到块缓冲头部
    pub fn write_to(&self, buf: &mut [u8]) {
        unsafe { core::ptr::write_unaligned(buf.as_mut_ptr() as *mut Self, *self) }
    }
}

//=============================================================================
// Inode
//=============================================================================

/// Inode 结构（固定头部，64 字节）
///
/// 偏移 64 之后的区域由 [`ChainList`]（带 CHAIN 标志的分配器 inode）
/// 或 [`ExtentList`]（普通文件/目录）占用。
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct cfs_dinode {
    pub i_signature: [u8; 8],   // 0: 签名
    pub i_generation: u32,      // 8: 代数
    pub i_check: u32,           // 12: 校验和
    pub i_blkno: u64,           // 16: 本块块号
    pub i_size: u64,            // 24: 字节大小
    pub i_flags: u32,           // 32: 标志
    pub i_clusters: u32,        // 36: 占用的簇数
    pub i_suballoc_slot: u16,   // 40: 所属分配器槽位
    pub i_suballoc_bit: u16,    // 42: 所属分配组内的位
    pub i_ftype: u16,           // 44: 文件类型
    pub i_links: u16,           // 46: 链接数
    pub i_bitmap_total: u32,    // 48: （分配器）总位数
    pub i_bitmap_used: u32,     // 52: （分配器）已用位数
    pub i_reserved: [u32; 2],   // 56: 保留
}

impl Default for cfs_dinode {
    fn default() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

impl cfs_dinode {
    /// 检查签名
    pub fn is_valid(&self) -> bool {
        &self.i_signature == CFS_INODE_SIGNATURE
    }

    /// 获取标志
    pub fn flags(&self) -> u32 {
        u32::from_le(self.i_flags)
    }

    /// 是否是链式分配器 inode
    pub fn is_chain(&self) -> bool {
        self.flags() & CFS_INODE_CHAIN_FL != 0
    }

    /// 是否是目录
    pub fn is_dir(&self) -> bool {
        u16::from_le(self.i_ftype) == CFS_FT_DIR as u16
    }

    /// 获取本块块号
    pub fn blkno(&self) -> u64 {
        u64::from_le(self.i_blkno)
    }

    /// 获取字节大小
    pub fn size(&self) -> u64 {
        u64::from_le(self.i_size)
    }

    /// 获取所属分配器槽位
    pub fn suballoc_slot(&self) -> u16 {
        u16::from_le(self.i_suballoc_slot)
    }

    /// 从块缓冲解析
    pub fn from_block(buf: &[u8]) -> Self {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }

    /// 序列化到块缓冲头部
    pub fn write_to(&self, buf: &mut [u8]) {
        unsafe { core::ptr::write_unaligned(buf.as_mut_ptr() as *mut Self, *self) }
    }
}

//=============================================================================
// 组描述符
//=============================================================================

/// 组描述符头部（48 字节，其后是位图）
///
/// 位 `i` 覆盖块 `bg_blkno + i`；位 0 覆盖描述符本身，恒为已分配。
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct cfs_group_desc {
    pub bg_signature: [u8; 8],    // 0: 签名
    pub bg_generation: u32,       // 8: 代数
    pub bg_check: u32,            // 12: 校验和
    pub bg_blkno: u64,            // 16: 本块块号
    pub bg_next_group: u64,       // 24: 链上下一个组（0 表示链尾）
    pub bg_parent_blkno: u64,     // 32: 所属分配器 inode 块号
    pub bg_chain: u16,            // 40: 所在链的下标
    pub bg_size: u16,             // 42: 位图容量（字节）
    pub bg_bits: u16,             // 44: 总位数
    pub bg_free_bits_count: u16,  // 46: 空闲位数
}

impl Default for cfs_group_desc {
    fn default() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

impl cfs_group_desc {
    /// 检查签名
    pub fn is_valid(&self) -> bool {
        &self.bg_signature == CFS_GROUP_SIGNATURE
    }

    /// 获取本块块号
    pub fn blkno(&self) -> u64 {
        u64::from_le(self.bg_blkno)
    }

    /// 获取链上下一个组
    pub fn next_group(&self) -> u64 {
        u64::from_le(self.bg_next_group)
    }

    /// 获取所属分配器
    pub fn parent_blkno(&self) -> u64 {
        u64::from_le(self.bg_parent_blkno)
    }

    /// 获取所在链的下标
    pub fn chain(&self) -> u16 {
        u16::from_le(self.bg_chain)
    }

    /// 获取总位数
    pub fn bits(&self) -> u16 {
        u16::from_le(self.bg_bits)
    }

    /// 获取空闲位数
    pub fn free_bits(&self) -> u16 {
        u16::from_le(self.bg_free_bits_count)
    }

    /// 获取位图容量（字节）
    pub fn bitmap_size(&self) -> u16 {
        u16::from_le(self.bg_size)
    }

    /// 从块缓冲解析
    pub fn from_block(buf: &[u8]) -> Self {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }

    /// 序列化到块缓冲头部
    pub fn write_to(&self, buf: &mut [u8]) {
        unsafe { core::ptr::write_unaligned(buf.as_mut_ptr() as *mut Self, *self) }
    }
}

//=============================================================================
// Extent 块
//=============================================================================

/// Extent 块头部（32 字节，其后是 extent 表）
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct cfs_extent_block {
    pub eb_signature: [u8; 8],   // 0: 签名
    pub eb_generation: u32,      // 8: 代数
    pub eb_check: u32,           // 12: 校验和
    pub eb_blkno: u64,           // 16: 本块块号
    pub eb_suballoc_slot: u16,   // 24: 所属分配器槽位
    pub eb_suballoc_bit: u16,    // 26: 所属分配组内的位
    pub eb_reserved: u32,        // 28: 保留
}

impl Default for cfs_extent_block {
    fn default() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

impl cfs_extent_block {
    /// 检查签名
    pub fn is_valid(&self) -> bool {
        &self.eb_signature == CFS_EXTENT_SIGNATURE
    }

    /// 获取本块块号
    pub fn blkno(&self) -> u64 {
        u64::from_le(self.eb_blkno)
    }

    /// 从块缓冲解析
    pub fn from_block(buf: &[u8]) -> Self {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }

    /// 序列化到块缓冲头部
    pub fn write_to(&self, buf: &mut [u8]) {
        unsafe { core::ptr::write_unaligned(buf.as_mut_ptr() as *mut Self, *self) }
    }
}

//=============================================================================
// 链表（分配器 inode 的尾部区域）
//=============================================================================

/// 链记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainRec {
    /// 链头组描述符块号（0 表示空链）
    pub c_blkno: u64,
    /// 链上的总位数
    pub c_total: u32,
    /// 链上的空闲位数
    pub c_free: u32,
}

/// 链表：一个分配器 inode 的全部链记录
///
/// 磁盘布局：`cl_count`/`cl_next_free_rec`/`cl_bpg` 头部加记录数组，
/// 记录依次为 `{ c_blkno: u64, c_total: u32, c_free: u32 }`。
#[derive(Debug, Clone, Default)]
pub struct ChainList {
    /// 可容纳的链记录数
    pub cl_count: u16,
    /// 已使用的链记录数
    pub cl_next_free_rec: u16,
    /// 每个组的位数（固定的组容量）
    pub cl_bpg: u16,
    /// 链记录（长度恒为 `cl_count`，未用的记录为零）
    pub recs: Vec<ChainRec>,
}

impl ChainList {
    /// 按块大小计算可容纳的链记录数
    pub fn capacity_for(block_size: usize) -> u16 {
        ((block_size - CFS_INODE_LIST_OFFSET - CFS_LIST_HEADER_SIZE) / CFS_LIST_REC_SIZE) as u16
    }

    /// 从 inode 块缓冲解码
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let area = &buf[CFS_INODE_LIST_OFFSET..];
        let cl_count = LittleEndian::read_u16(&area[0..2]);
        let cl_next_free_rec = LittleEndian::read_u16(&area[2..4]);
        let cl_bpg = LittleEndian::read_u16(&area[4..6]);

        if cl_next_free_rec > cl_count {
            return Err(Error::new(ErrorKind::Corrupted, "chain list next_free_rec beyond count"));
        }
        let need = CFS_LIST_HEADER_SIZE + cl_count as usize * CFS_LIST_REC_SIZE;
        if need > area.len() {
            return Err(Error::new(ErrorKind::Corrupted, "chain list larger than inode block"));
        }

        let mut recs = Vec::with_capacity(cl_count as usize);
        for i in 0..cl_count as usize {
            let off = CFS_LIST_HEADER_SIZE + i * CFS_LIST_REC_SIZE;
            recs.push(ChainRec {
                c_blkno: LittleEndian::read_u64(&area[off..off + 8]),
                c_total: LittleEndian::read_u32(&area[off + 8..off + 12]),
                c_free: LittleEndian::read_u32(&area[off + 12..off + 16]),
            });
        }

        Ok(Self {
            cl_count,
            cl_next_free_rec,
            cl_bpg,
            recs,
        })
    }

    /// 编码回 inode 块缓冲
    pub fn encode(&self, buf: &mut [u8]) {
        let area = &mut buf[CFS_INODE_LIST_OFFSET..];
        LittleEndian::write_u16(&mut area[0..2], self.cl_count);
        LittleEndian::write_u16(&mut area[2..4], self.cl_next_free_rec);
        LittleEndian::write_u16(&mut area[4..6], self.cl_bpg);
        LittleEndian::write_u16(&mut area[6..8], 0);
        for (i, rec) in self.recs.iter().enumerate() {
            let off = CFS_LIST_HEADER_SIZE + i * CFS_LIST_REC_SIZE;
            LittleEndian::write_u64(&mut area[off..off + 8], rec.c_blkno);
            LittleEndian::write_u32(&mut area[off + 8..off + 12], rec.c_total);
            LittleEndian::write_u32(&mut area[off + 12..off + 16], rec.c_free);
        }
    }
}

//=============================================================================
// Extent 表（inode 或 extent 块的尾部区域）
//=============================================================================

/// Extent 记录：逻辑块 `e_cpos` 起的 `e_blocks` 个块映射到物理块 `e_blkno` 起
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtentRec {
    /// 物理起始块号
    pub e_blkno: u64,
    /// 逻辑起始块号
    pub e_cpos: u32,
    /// 块数（depth > 0 时为子树覆盖的块数）
    pub e_blocks: u32,
}

/// Extent 表
#[derive(Debug, Clone, Default)]
pub struct ExtentList {
    /// 可容纳的记录数
    pub l_count: u16,
    /// 已使用的记录数
    pub l_next_free_rec: u16,
    /// 树深度（0 表示记录直接映射数据块）
    pub l_tree_depth: u16,
    /// 记录（仅保存已使用的）
    pub recs: Vec<ExtentRec>,
}

impl ExtentList {
    /// 按起始偏移和块大小计算可容纳的记录数
    pub fn capacity_for(block_size: usize, list_offset: usize) -> u16 {
        ((block_size - list_offset - CFS_LIST_HEADER_SIZE) / CFS_LIST_REC_SIZE) as u16
    }

    /// 从块缓冲的 `list_offset` 处解码
    pub fn decode(buf: &[u8], list_offset: usize) -> Result<Self> {
        let area = &buf[list_offset..];
        let l_count = LittleEndian::read_u16(&area[0..2]);
        let l_next_free_rec = LittleEndian::read_u16(&area[2..4]);
        let l_tree_depth = LittleEndian::read_u16(&area[4..6]);

        if l_next_free_rec > l_count {
            return Err(Error::new(ErrorKind::Corrupted, "extent list next_free_rec beyond count"));
        }
        let need = CFS_LIST_HEADER_SIZE + l_count as usize * CFS_LIST_REC_SIZE;
        if need > area.len() {
            return Err(Error::new(ErrorKind::Corrupted, "extent list larger than block"));
        }

        let mut recs = Vec::with_capacity(l_next_free_rec as usize);
        for i in 0..l_next_free_rec as usize {
            let off = CFS_LIST_HEADER_SIZE + i * CFS_LIST_REC_SIZE;
            recs.push(ExtentRec {
                e_blkno: LittleEndian::read_u64(&area[off..off + 8]),
                e_cpos: LittleEndian::read_u32(&area[off + 8..off + 12]),
                e_blocks: LittleEndian::read_u32(&area[off + 12..off + 16]),
            });
        }

        Ok(Self {
            l_count,
            l_next_free_rec,
            l_tree_depth,
            recs,
        })
    }

    /// 编码回块缓冲的 `list_offset` 处
    pub fn encode(&self, buf: &mut [u8], list_offset: usize) {
        let area = &mut buf[list_offset..];
        LittleEndian::write_u16(&mut area[0..2], self.l_count);
        LittleEndian::write_u16(&mut area[2..4], self.l_next_free_rec);
        LittleEndian::write_u16(&mut area[4..6], self.l_tree_depth);
        LittleEndian::write_u16(&mut area[6..8], 0);
        for (i, rec) in self.recs.iter().enumerate() {
            let off = CFS_LIST_HEADER_SIZE + i * CFS_LIST_REC_SIZE;
            LittleEndian::write_u64(&mut area[off..off + 8], rec.e_blkno);
            LittleEndian::write_u32(&mut area[off + 8..off + 12], rec.e_cpos);
            LittleEndian::write_u32(&mut area[off + 12..off + 16], rec.e_blocks);
        }
        // 清掉未使用的记录区
        let used = CFS_LIST_HEADER_SIZE + self.recs.len() * CFS_LIST_REC_SIZE;
        let cap = CFS_LIST_HEADER_SIZE + self.l_count as usize * CFS_LIST_REC_SIZE;
        for b in &mut area[used..cap] {
            *b = 0;
        }
    }
}

//=============================================================================
// 目录项
//=============================================================================

/// 解码后的目录项头部
///
/// `rec_len` 是该项在块中的跨度；实际占用是
/// [`cfs_dir_rec_len`]`(name_len)`，两者之差是项尾部的空闲空间。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntryHeader {
    /// 指向的 inode（0 表示已删除）
    pub inode: u64,
    /// 本项跨度
    pub rec_len: u16,
    /// 名字长度
    pub name_len: u8,
    /// 文件类型
    pub file_type: u8,
}

impl DirEntryHeader {
    /// 从目录块 `offset` 处解码一个目录项头部，并做跨度合法性检查
    ///
    /// 跨度错位、小于最小值、与名字长度矛盾或越过块尾都视为目录损坏。
    pub fn decode(buf: &[u8], offset: usize, blkno: u64) -> Result<Self> {
        if offset + CFS_DIR_ENTRY_HEADER > buf.len() {
            return Err(Error::corrupt(
                CorruptKind::BadDirEntry,
                blkno,
                "directory entry header beyond block end",
            ));
        }
        let ent = &buf[offset..];
        let hdr = Self {
            inode: LittleEndian::read_u64(&ent[0..8]),
            rec_len: LittleEndian::read_u16(&ent[8..10]),
            name_len: ent[10],
            file_type: ent[11],
        };

        let rec_len = hdr.rec_len as usize;
        if rec_len < CFS_DIR_ENTRY_MIN
            || rec_len % CFS_DIR_ALIGN != 0
            || CFS_DIR_ENTRY_HEADER + hdr.name_len as usize > rec_len
            || offset + rec_len > buf.len()
        {
            return Err(Error::corrupt(
                CorruptKind::BadDirEntry,
                blkno,
                "directory entry has invalid length",
            ));
        }

        Ok(hdr)
    }

    /// 编码到目录块 `offset` 处（不触碰名字字节）
    pub fn encode(&self, buf: &mut [u8], offset: usize) {
        let ent = &mut buf[offset..];
        LittleEndian::write_u64(&mut ent[0..8], self.inode);
        LittleEndian::write_u16(&mut ent[8..10], self.rec_len);
        ent[10] = self.name_len;
        ent[11] = self.file_type;
    }

    /// 该项实际占用的字节数（按名字长度对齐后）
    pub fn used_len(&self) -> usize {
        cfs_dir_rec_len(self.name_len)
    }

    /// 该项是否存活
    pub fn is_live(&self) -> bool {
        self.inode != 0
    }
}

//=============================================================================
// 目录块尾部
//=============================================================================

/// 目录块尾部结构（64 字节，位于块尾的固定偏移）
///
/// 前 12 字节伪装成一个已删除的目录项（`inode == 0`，跨度恰为 64），
/// 这样不识别尾部的目录遍历代码会自然跳过它。
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct cfs_dir_trailer {
    pub db_compat_inode: u64,     // +0: 恒为 0
    pub db_compat_rec_len: u16,   // +8: 恒为 64
    pub db_compat_name_len: u8,   // +10: 恒为 0
    pub db_compat_file_type: u8,  // +11: 恒为 0
    pub db_reserved0: u32,        // +12: 保留
    pub db_signature: [u8; 8],    // +16: 签名
    pub db_check: u32,            // +24: 校验和
    pub db_free_rec_len: u16,     // +28: 块内最大空闲跨度
    pub db_pad: u16,              // +30: 填充
    pub db_blkno: u64,            // +32: 本块块号
    pub db_parent_dinode: u64,    // +40: 所属目录 inode
    pub db_free_next: u64,        // +48: 空闲链中的下一块
    pub db_reserved1: u64,        // +56: 保留
}

impl Default for cfs_dir_trailer {
    fn default() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

impl cfs_dir_trailer {
    /// 检查签名
    pub fn is_valid(&self) -> bool {
        &self.db_signature == CFS_DIR_TRAILER_SIGNATURE
    }

    /// 从目录块缓冲的尾部偏移处解析
    pub fn from_block(buf: &[u8], trailer_off: usize) -> Self {
        unsafe { core::ptr::read_unaligned(buf[trailer_off..].as_ptr() as *const Self) }
    }

    /// 序列化到目录块缓冲的尾部偏移处
    pub fn write_to(&self, buf: &mut [u8], trailer_off: usize) {
        unsafe {
            core::ptr::write_unaligned(buf[trailer_off..].as_mut_ptr() as *mut Self, *self)
        }
    }
}

//=============================================================================
// 系统表
//=============================================================================

/// 系统表头部（24 字节，其后是表项）
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct cfs_system_table {
    pub st_signature: [u8; 8],  // 0: 签名
    pub st_generation: u32,     // 8: 代数
    pub st_check: u32,          // 12: 校验和
    pub st_count: u32,          // 16: 表项数
    pub st_reserved: u32,       // 20: 保留
}

impl Default for cfs_system_table {
    fn default() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

impl cfs_system_table {
    /// 检查签名
    pub fn is_valid(&self) -> bool {
        &self.st_signature == CFS_SYSTAB_SIGNATURE
    }

    /// 从块缓冲解析
    pub fn from_block(buf: &[u8]) -> Self {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) }
    }

    /// 序列化到块缓冲头部
    pub fn write_to(&self, buf: &mut [u8]) {
        unsafe { core::ptr::write_unaligned(buf.as_mut_ptr() as *mut Self, *self) }
    }
}

/// 系统表项：某个系统 inode 的位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTableEntry {
    /// 系统 inode 类型（见 `CFS_SYS_*`）
    pub e_type: u16,
    /// 所属槽位（无槽位的类型为 0）
    pub e_slot: u16,
    /// inode 块号
    pub e_blkno: u64,
}

impl SystemTableEntry {
    /// 从系统表块解码全部表项
    pub fn decode_all(buf: &[u8]) -> Result<Vec<Self>> {
        let header = cfs_system_table::from_block(buf);
        let count = u32::from_le(header.st_count) as usize;
        let need = CFS_SYSTAB_HEADER_SIZE + count * CFS_SYSTAB_ENTRY_SIZE;
        if need > buf.len() {
            return Err(Error::new(ErrorKind::Corrupted, "system table larger than its block"));
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let off = CFS_SYSTAB_HEADER_SIZE + i * CFS_SYSTAB_ENTRY_SIZE;
            entries.push(Self {
                e_type: LittleEndian::read_u16(&buf[off..off + 2]),
                e_slot: LittleEndian::read_u16(&buf[off + 2..off + 4]),
                e_blkno: LittleEndian::read_u64(&buf[off + 8..off + 16]),
            });
        }
        Ok(entries)
    }

    /// 把全部表项编码回系统表块（同时更新头部计数）
    pub fn encode_all(entries: &[Self], buf: &mut [u8]) {
        let mut header = cfs_system_table::from_block(buf);
        header.st_count = (entries.len() as u32).to_le();
        header.write_to(buf);
        for (i, e) in entries.iter().enumerate() {
            let off = CFS_SYSTAB_HEADER_SIZE + i * CFS_SYSTAB_ENTRY_SIZE;
            LittleEndian::write_u16(&mut buf[off..off + 2], e.e_type);
            LittleEndian::write_u16(&mut buf[off + 2..off + 4], e.e_slot);
            LittleEndian::write_u32(&mut buf[off + 4..off + 8], 0);
            LittleEndian::write_u64(&mut buf[off + 8..off + 16], e.e_blkno);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(core::mem::size_of::<cfs_super_block>(), 120);
        assert_eq!(core::mem::size_of::<cfs_dinode>(), CFS_INODE_LIST_OFFSET);
        assert_eq!(core::mem::size_of::<cfs_group_desc>(), CFS_GROUP_HEADER_SIZE);
        assert_eq!(core::mem::size_of::<cfs_extent_block>(), CFS_EXTENT_LIST_OFFSET);
        assert_eq!(core::mem::size_of::<cfs_dir_trailer>(), CFS_DIR_TRAILER_SIZE);
        assert_eq!(core::mem::size_of::<cfs_system_table>(), CFS_SYSTAB_HEADER_SIZE);
    }

    #[test]
    fn test_superblock_roundtrip() {
        let mut sb = cfs_super_block::default();
        sb.s_signature = *CFS_SUPER_SIGNATURE;
        sb.s_blocksize_bits = 10u32.to_le();
        sb.s_total_blocks = 2048u64.to_le();
        sb.s_max_slots = 4u16.to_le();

        let mut buf = vec![0u8; 1024];
        sb.write_to(&mut buf);
        let back = cfs_super_block::from_block(&buf);

        assert!(back.is_valid());
        assert_eq!(back.block_size(), 1024);
        assert_eq!(back.total_blocks(), 2048);
        assert_eq!(back.max_slots(), 4);
    }

    #[test]
    fn test_chain_list_roundtrip() {
        let mut buf = vec![0u8; 1024];
        let cap = ChainList::capacity_for(1024);
        let mut cl = ChainList {
            cl_count: cap,
            cl_next_free_rec: 2,
            cl_bpg: 100,
            recs: vec![ChainRec::default(); cap as usize],
        };
        cl.recs[0] = ChainRec { c_blkno: 500, c_total: 100, c_free: 10 };
        cl.recs[1] = ChainRec { c_blkno: 600, c_total: 100, c_free: 0 };

        cl.encode(&mut buf);
        let back = ChainList::decode(&buf).unwrap();

        assert_eq!(back.cl_count, cap);
        assert_eq!(back.cl_next_free_rec, 2);
        assert_eq!(back.cl_bpg, 100);
        assert_eq!(back.recs[0], ChainRec { c_blkno: 500, c_total: 100, c_free: 10 });
        assert_eq!(back.recs[1].c_blkno, 600);
        assert_eq!(back.recs[2], ChainRec::default());
    }

    #[test]
    fn test_chain_list_rejects_bad_next_free() {
        let mut buf = vec![0u8; 1024];
        LittleEndian::write_u16(&mut buf[CFS_INODE_LIST_OFFSET..], 2);
        LittleEndian::write_u16(&mut buf[CFS_INODE_LIST_OFFSET + 2..], 9);
        assert!(ChainList::decode(&buf).is_err());
    }

    #[test]
    fn test_extent_list_roundtrip() {
        let mut buf = vec![0u8; 1024];
        let el = ExtentList {
            l_count: ExtentList::capacity_for(1024, CFS_INODE_LIST_OFFSET),
            l_next_free_rec: 1,
            l_tree_depth: 0,
            recs: vec![ExtentRec { e_blkno: 321, e_cpos: 0, e_blocks: 4 }],
        };
        el.encode(&mut buf, CFS_INODE_LIST_OFFSET);
        let back = ExtentList::decode(&buf, CFS_INODE_LIST_OFFSET).unwrap();

        assert_eq!(back.l_next_free_rec, 1);
        assert_eq!(back.l_tree_depth, 0);
        assert_eq!(back.recs[0], ExtentRec { e_blkno: 321, e_cpos: 0, e_blocks: 4 });
    }

    #[test]
    fn test_dir_entry_roundtrip() {
        let mut buf = vec![0u8; 1024];
        let hdr = DirEntryHeader {
            inode: 7,
            rec_len: 16,
            name_len: 3,
            file_type: CFS_FT_REG_FILE,
        };
        hdr.encode(&mut buf, 0);
        buf[12..15].copy_from_slice(b"foo");

        let back = DirEntryHeader::decode(&buf, 0, 1).unwrap();
        assert_eq!(back, hdr);
        assert_eq!(back.used_len(), 16);
        assert!(back.is_live());
    }

    #[test]
    fn test_dir_entry_rejects_misaligned_len() {
        let mut buf = vec![0u8; 1024];
        let hdr = DirEntryHeader {
            inode: 7,
            rec_len: 18, // 不是 4 的倍数
            name_len: 3,
            file_type: CFS_FT_REG_FILE,
        };
        hdr.encode(&mut buf, 0);

        let err = DirEntryHeader::decode(&buf, 0, 9).unwrap_err();
        assert_eq!(err.corrupt_kind(), Some(CorruptKind::BadDirEntry));
        assert_eq!(err.blkno(), Some(9));
    }

    #[test]
    fn test_dir_entry_rejects_name_longer_than_span() {
        let mut buf = vec![0u8; 1024];
        let hdr = DirEntryHeader {
            inode: 7,
            rec_len: 16,
            name_len: 10, // 12 + 10 > 16
            file_type: CFS_FT_REG_FILE,
        };
        hdr.encode(&mut buf, 0);
        assert!(DirEntryHeader::decode(&buf, 0, 1).is_err());
    }

    #[test]
    fn test_trailer_compat_fields_parse_as_dead_entry() {
        let mut buf = vec![0u8; 1024];
        let toff = 1024 - CFS_DIR_TRAILER_SIZE;
        let mut trailer = cfs_dir_trailer::default();
        trailer.db_signature = *CFS_DIR_TRAILER_SIGNATURE;
        trailer.db_compat_rec_len = (CFS_DIR_TRAILER_SIZE as u16).to_le();
        trailer.db_blkno = 55u64.to_le();
        trailer.write_to(&mut buf, toff);

        // 尾部在目录遍历眼里是一个跨度 64 的死项
        let as_entry = DirEntryHeader::decode(&buf, toff, 55).unwrap();
        assert!(!as_entry.is_live());
        assert_eq!(as_entry.rec_len as usize, CFS_DIR_TRAILER_SIZE);

        let back = cfs_dir_trailer::from_block(&buf, toff);
        assert!(back.is_valid());
        assert_eq!(u64::from_le(back.db_blkno), 55);
    }

    #[test]
    fn test_system_table_roundtrip() {
        let mut buf = vec![0u8; 1024];
        let mut header = cfs_system_table::default();
        header.st_signature = *CFS_SYSTAB_SIGNATURE;
        header.write_to(&mut buf);

        let entries = [
            SystemTableEntry { e_type: CFS_SYS_GLOBAL_BITMAP, e_slot: 0, e_blkno: 8 },
            SystemTableEntry { e_type: CFS_SYS_INODE_ALLOC, e_slot: 1, e_blkno: 9 },
        ];
        SystemTableEntry::encode_all(&entries, &mut buf);

        let back = SystemTableEntry::decode_all(&buf).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0], entries[0]);
        assert_eq!(back[1], entries[1]);
    }
}
