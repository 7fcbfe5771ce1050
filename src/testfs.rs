//! 测试卷构造
//!
//! 在内存设备上格式化一个小而完整的卷：系统表、全局位图、
//! 每槽位的 inode/extent 分配器、根目录和两个普通文件。
//! 所有计数都保持一致，新格式化的卷能通过一致性校验。
//!
//! 布局（块大小 512，共 1024 块）：
//!
//! ```text
//! 0    superblock          64   inode 组（槽 0）
//! 1    系统表               96   inode 组（槽 1）
//! 2    全局位图分配器        128  extent 组（槽 0）
//! 3,4  extent 分配器        160  extent 组（槽 1）
//! 5,6  inode 分配器         256  全局组（覆盖 256..511）
//! ```

use crate::block::tests_support::MemDevice;
use crate::block::BlockDev;
use crate::consts::*;
use crate::dir::tests_support::put_entry;
use crate::extent::{write_extent_block, ExtentBlock};
use crate::group::{write_group_desc, GroupDesc};
use crate::inode::{write_inode, Inode};
use crate::superblock::{write_superblock, Superblock};
use crate::types::*;
use alloc::vec;

/// 测试卷块大小
pub const BS: usize = 512;
/// 全局位图分配器 inode
pub const GLOBAL_ALLOC_BLKNO: u64 = 2;
/// 根目录 inode
pub const ROOT_DIR_BLKNO: u64 = 65;
/// 根目录数据块
pub const ROOT_DIR_DATA_BLKNO: u64 = 257;
/// 槽 0 的普通文件 inode
pub const FILE_A_BLKNO: u64 = 66;
/// 槽 1 的普通文件 inode
pub const FILE_B_BLKNO: u64 = 97;

/// 某槽位的 extent 分配器 inode 块号
pub fn ext_alloc_blkno(slots: u16, slot: u16) -> u64 {
    debug_assert!(slot < slots);
    3 + slot as u64
}

/// 某槽位的 inode 分配器 inode 块号
pub fn ino_alloc_blkno(slots: u16, slot: u16) -> u64 {
    3 + slots as u64 + slot as u64
}

fn mk_sb(slots: u16) -> Superblock {
    let mut inner = cfs_super_block::default();
    inner.s_signature = *CFS_SUPER_SIGNATURE;
    inner.s_generation = 1u32.to_le();
    inner.s_blocksize_bits = 9u32.to_le();
    inner.s_total_blocks = 1024u64.to_le();
    inner.s_max_slots = slots.to_le();
    inner.s_root_blkno = ROOT_DIR_BLKNO.to_le();
    inner.s_system_table_blkno = 1u64.to_le();
    inner.s_label[..4].copy_from_slice(b"test");
    Superblock::new(inner)
}

fn mk_inode(blkno: u64, flags: u32, ftype: u16, slot: u16, bit: u16) -> Inode {
    let mut inner = cfs_dinode::default();
    inner.i_signature = *CFS_INODE_SIGNATURE;
    inner.i_generation = 1u32.to_le();
    inner.i_blkno = blkno.to_le();
    inner.i_flags = flags.to_le();
    inner.i_ftype = ftype.to_le();
    inner.i_links = 1u16.to_le();
    inner.i_suballoc_slot = slot.to_le();
    inner.i_suballoc_bit = bit.to_le();
    Inode {
        inner,
        buf: vec![0u8; BS],
    }
}

fn mk_chain_alloc(
    bdev: &mut BlockDev<MemDevice>,
    sb: &Superblock,
    blkno: u64,
    bpg: u16,
    rec: Option<ChainRec>,
    used_bits: u32,
) {
    let flags = CFS_INODE_VALID_FL | CFS_INODE_SYSTEM_FL | CFS_INODE_BITMAP_FL | CFS_INODE_CHAIN_FL;
    let mut ino = mk_inode(blkno, flags, 0, 0, 0);

    let count = ChainList::capacity_for(BS);
    let mut recs = vec![ChainRec::default(); count as usize];
    let mut next_free = 0u16;
    let mut total = 0u32;
    if let Some(r) = rec {
        total = r.c_total;
        recs[0] = r;
        next_free = 1;
    }
    ino.set_chain_list(&ChainList {
        cl_count: count,
        cl_next_free_rec: next_free,
        cl_bpg: bpg,
        recs,
    });
    ino.set_bitmap_total(total);
    ino.set_bitmap_used(used_bits);
    write_inode(bdev, sb, &mut ino).unwrap();
}

fn mk_group_with_bits(
    bdev: &mut BlockDev<MemDevice>,
    sb: &Superblock,
    blkno: u64,
    parent: u64,
    bits: u16,
    set: &[u32],
) {
    let mut inner = cfs_group_desc::default();
    inner.bg_signature = *CFS_GROUP_SIGNATURE;
    inner.bg_generation = 1u32.to_le();
    inner.bg_blkno = blkno.to_le();
    inner.bg_parent_blkno = parent.to_le();
    inner.bg_chain = 0u16.to_le();
    inner.bg_size = ((BS - CFS_GROUP_HEADER_SIZE) as u16).to_le();
    inner.bg_bits = bits.to_le();
    inner.bg_free_bits_count = (bits - set.len() as u16).to_le();

    let mut gd = GroupDesc {
        inner,
        buf: vec![0u8; BS],
    };
    for &bit in set {
        crate::bitmap::set_bit(gd.bitmap_mut(), bit).unwrap();
    }
    write_group_desc(bdev, sb, &mut gd).unwrap();
}

fn mk_depth1_file(
    bdev: &mut BlockDev<MemDevice>,
    sb: &Superblock,
    blkno: u64,
    slot: u16,
    bit: u16,
    eb_blkno: u64,
    data_start: u64,
    data_blocks: u32,
) {
    let mut ino = mk_inode(blkno, CFS_INODE_VALID_FL, CFS_FT_REG_FILE as u16, slot, bit);
    ino.set_clusters(data_blocks);
    ino.set_size(data_blocks as u64 * BS as u64);
    ino.set_extent_list(&ExtentList {
        l_count: ExtentList::capacity_for(BS, CFS_INODE_LIST_OFFSET),
        l_next_free_rec: 1,
        l_tree_depth: 1,
        recs: vec![ExtentRec { e_blkno: eb_blkno, e_cpos: 0, e_blocks: data_blocks }],
    });
    write_inode(bdev, sb, &mut ino).unwrap();

    let mut inner = cfs_extent_block::default();
    inner.eb_signature = *CFS_EXTENT_SIGNATURE;
    inner.eb_generation = 1u32.to_le();
    inner.eb_blkno = eb_blkno.to_le();
    inner.eb_suballoc_slot = slot.to_le();
    inner.eb_suballoc_bit = 1u16.to_le();
    let mut eb = ExtentBlock {
        inner,
        buf: vec![0u8; BS],
    };
    eb.set_extent_list(&ExtentList {
        l_count: ExtentList::capacity_for(BS, CFS_EXTENT_LIST_OFFSET),
        l_next_free_rec: 1,
        l_tree_depth: 0,
        recs: vec![ExtentRec { e_blkno: data_start, e_cpos: 0, e_blocks: data_blocks }],
    });
    write_extent_block(bdev, sb, &mut eb).unwrap();
}

/// 格式化一个测试卷并返回底层设备
///
/// `slots` 当前支持 2。根目录有三个活项，最后一项跨过目录块的
/// 尾部偏移（448），开启依赖尾部的特性时恰好需要搬迁一项、
/// 新增一块。
pub fn build_volume(slots: u16) -> MemDevice {
    assert_eq!(slots, 2, "the canonical test volume has two slots");

    let sb = mk_sb(slots);
    let mut bdev = BlockDev::new(MemDevice::new(1024, BS as u32)).unwrap();

    write_superblock(&mut bdev, &sb).unwrap();

    // 系统表
    let mut systab = vec![0u8; BS];
    let mut header = cfs_system_table::default();
    header.st_signature = *CFS_SYSTAB_SIGNATURE;
    header.st_generation = 1u32.to_le();
    header.write_to(&mut systab);
    let entries = [
        SystemTableEntry { e_type: CFS_SYS_GLOBAL_BITMAP, e_slot: 0, e_blkno: GLOBAL_ALLOC_BLKNO },
        SystemTableEntry { e_type: CFS_SYS_EXTENT_ALLOC, e_slot: 0, e_blkno: ext_alloc_blkno(slots, 0) },
        SystemTableEntry { e_type: CFS_SYS_EXTENT_ALLOC, e_slot: 1, e_blkno: ext_alloc_blkno(slots, 1) },
        SystemTableEntry { e_type: CFS_SYS_INODE_ALLOC, e_slot: 0, e_blkno: ino_alloc_blkno(slots, 0) },
        SystemTableEntry { e_type: CFS_SYS_INODE_ALLOC, e_slot: 1, e_blkno: ino_alloc_blkno(slots, 1) },
    ];
    SystemTableEntry::encode_all(&entries, &mut systab);
    bdev.write_block(1, &systab).unwrap();

    // 分配器 inode：全局位图 + 每槽位两个子分配器
    mk_chain_alloc(
        &mut bdev,
        &sb,
        GLOBAL_ALLOC_BLKNO,
        256,
        Some(ChainRec { c_blkno: 256, c_total: 256, c_free: 250 }),
        6,
    );
    mk_chain_alloc(
        &mut bdev,
        &sb,
        ext_alloc_blkno(slots, 0),
        32,
        Some(ChainRec { c_blkno: 128, c_total: 32, c_free: 30 }),
        2,
    );
    mk_chain_alloc(
        &mut bdev,
        &sb,
        ext_alloc_blkno(slots, 1),
        32,
        Some(ChainRec { c_blkno: 160, c_total: 32, c_free: 30 }),
        2,
    );
    mk_chain_alloc(
        &mut bdev,
        &sb,
        ino_alloc_blkno(slots, 0),
        32,
        Some(ChainRec { c_blkno: 64, c_total: 32, c_free: 29 }),
        3,
    );
    mk_chain_alloc(
        &mut bdev,
        &sb,
        ino_alloc_blkno(slots, 1),
        32,
        Some(ChainRec { c_blkno: 96, c_total: 32, c_free: 30 }),
        2,
    );

    // 分配组：位 0 永远是描述符自己
    mk_group_with_bits(&mut bdev, &sb, 64, ino_alloc_blkno(slots, 0), 32, &[0, 1, 2]);
    mk_group_with_bits(&mut bdev, &sb, 96, ino_alloc_blkno(slots, 1), 32, &[0, 1]);
    mk_group_with_bits(&mut bdev, &sb, 128, ext_alloc_blkno(slots, 0), 32, &[0, 1]);
    mk_group_with_bits(&mut bdev, &sb, 160, ext_alloc_blkno(slots, 1), 32, &[0, 1]);
    mk_group_with_bits(&mut bdev, &sb, 256, GLOBAL_ALLOC_BLKNO, 256, &[0, 1, 2, 3, 4, 5]);

    // 根目录：inode 65（槽 0 位 1），数据块 257
    let mut root = mk_inode(ROOT_DIR_BLKNO, CFS_INODE_VALID_FL, CFS_FT_DIR as u16, 0, 1);
    root.set_clusters(1);
    root.set_size(BS as u64);
    root.set_extent_list(&ExtentList {
        l_count: ExtentList::capacity_for(BS, CFS_INODE_LIST_OFFSET),
        l_next_free_rec: 1,
        l_tree_depth: 0,
        recs: vec![ExtentRec { e_blkno: ROOT_DIR_DATA_BLKNO, e_cpos: 0, e_blocks: 1 }],
    });
    write_inode(&mut bdev, &sb, &mut root).unwrap();

    // 根目录内容：最后的 "gamma" 起于 436，实际占用 20 字节，
    // 跨过尾部偏移 448
    let mut dirblk = vec![0u8; BS];
    let off = put_entry(&mut dirblk, 0, FILE_A_BLKNO, 20, b"alpha");
    let off = put_entry(&mut dirblk, off, FILE_B_BLKNO, 416, b"beta");
    assert_eq!(off, 436);
    put_entry(&mut dirblk, off, FILE_B_BLKNO, (BS - off) as u16, b"gamma");
    bdev.write_block(ROOT_DIR_DATA_BLKNO, &dirblk).unwrap();

    // 两个普通文件，深度 1 的 extent 树
    mk_depth1_file(&mut bdev, &sb, FILE_A_BLKNO, 0, 2, 129, 258, 2);
    mk_depth1_file(&mut bdev, &sb, FILE_B_BLKNO, 1, 1, 161, 260, 2);

    bdev.into_device()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{OpenFlags, TuneSession};

    #[test]
    fn test_fresh_volume_is_validator_clean() {
        let device = build_volume(2);
        let session = TuneSession::open(device, OpenFlags::RW | OpenFlags::ALLOCATION).unwrap();
        session.close().unwrap();
    }

    #[test]
    fn test_fresh_volume_has_no_trailers() {
        let device = build_volume(2);
        let mut session = TuneSession::open(device, OpenFlags::RW).unwrap();
        assert!(!session.sb().supports_dir_trailer());

        let (bdev, _) = session.parts();
        let buf = bdev.read_block_vec(ROOT_DIR_DATA_BLKNO).unwrap();
        assert!(!crate::dir::block_has_trailer(&buf, ROOT_DIR_DATA_BLKNO));
    }
}
