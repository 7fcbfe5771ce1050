//! 分配组迁移
//!
//! 槽位数收缩时，被裁撤槽位的分配器要把名下所有分配组移交给
//! 幸存的分配器。迁移按组进行，每个组的迁移自成一致：组里每个
//! 已占用位对应的元数据块先改写所属槽位字段，然后组描述符换
//! 父换链头插进目的链，最后更新目的分配器的计数。中途 I/O 失败
//! 直接放弃整个操作，已迁移的组归属已经正确，不存在回滚。
//!
//! 组在发现时按链头到链尾记录，但按发现序的逆序迁移：离原链头
//! 最近的组最后动。这样迁移中断时原链头指向的仍然是一个结构
//! 完整的（可能已部分迁走的）链表，不会悬空。

use crate::block::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use crate::extent::{read_extent_block, write_extent_block};
use crate::group::{read_group_desc, write_group_desc, GroupDesc};
use crate::inode::{read_inode, write_inode, Inode};
use crate::superblock::Superblock;
use crate::types::{ChainList, ChainRec};
use alloc::vec::Vec;

/// 子分配器的类型，决定占用位指向哪种元数据块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAllocKind {
    /// inode 分配器：位覆盖 inode 块
    InodeAlloc,
    /// extent 块分配器：位覆盖 extent 块
    ExtentAlloc,
}

/// 迁移中的一个组：块号加整块描述符
///
/// 只在一次迁移步骤内存在，挂上目的链后立即销毁。
struct MovedGroup {
    blkno: u64,
    gd: GroupDesc,
}

/// 把一个块的所属槽位字段改写为新槽位
fn change_sub_alloc_slot<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    blkno: u64,
    kind: SubAllocKind,
    new_slot: u16,
) -> Result<()> {
    match kind {
        SubAllocKind::ExtentAlloc => {
            let mut eb = read_extent_block(bdev, sb, blkno)?;
            eb.set_suballoc_slot(new_slot);
            write_extent_block(bdev, sb, &mut eb)?;
        }
        SubAllocKind::InodeAlloc => {
            let mut di = read_inode(bdev, sb, blkno)?;
            di.set_suballoc_slot(new_slot);
            write_inode(bdev, sb, &mut di)?;
        }
    }
    Ok(())
}

/// 计算一条捐出链在目的分配器里的插入位置
///
/// 链表未满时开一条新链，已满时按累计组数对链数取模轮转。
/// 整条捐出链共用一个插入位置，链上的组不会被拆散。
fn insert_chain_pos(dst: &Inode, cl: &ChainList) -> u16 {
    if cl.cl_next_free_rec < cl.cl_count {
        cl.cl_next_free_rec
    } else {
        let groups_so_far = dst.bitmap_total() / cl.cl_bpg as u32;
        (groups_so_far % cl.cl_count as u32) as u16
    }
}

/// 把一个组挂到目的分配器的 `cr_pos` 链上
///
/// 组描述符改写父分配器、链下标和 next 指针后先落盘，
/// 然后才更新链记录和目的 inode 的计数并写回。
fn move_group<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    dst: &mut Inode,
    cr_pos: u16,
    group: &mut MovedGroup,
) -> Result<()> {
    let mut cl = dst.chain_list()?;

    let gd = &mut group.gd;
    let bits = gd.bits() as u32;
    let free_bits = gd.free_bits() as u32;

    gd.set_chain(cr_pos);
    gd.set_parent_blkno(dst.blkno());

    // 此时迁移链上位于本组之后的组都已经挂到了新位置，
    // 把 next 指向目的链的当前头不会丢组。
    gd.set_next_group(cl.recs[cr_pos as usize].c_blkno);

    write_group_desc(bdev, sb, gd)?;
    log::debug!(
        "[MIGRATE] group {} -> allocator {} chain {}",
        group.blkno,
        dst.blkno(),
        cr_pos
    );

    let cr = &mut cl.recs[cr_pos as usize];
    cr.c_blkno = gd.blkno();
    cr.c_total += bits;
    cr.c_free += free_bits;

    // 只有开新链的第一个组才推进 next_free_rec
    if cr_pos == cl.cl_next_free_rec && cl.cl_next_free_rec != cl.cl_count {
        cl.cl_next_free_rec += 1;
    }

    let bpg = cl.cl_bpg as u32;
    dst.set_chain_list(&cl);
    dst.set_bitmap_total(dst.bitmap_total() + bits);
    dst.set_bitmap_used(dst.bitmap_used() + bits - free_bits);
    dst.set_clusters(dst.clusters() + bpg);
    dst.set_size(dst.size() + bpg as u64 * sb.block_size() as u64);

    write_inode(bdev, sb, dst)
}

/// 迁移一条链上的全部组
///
/// 先顺着 next 链记录所有组，再逆序处理：改写每个占用位指向的
/// 块的所属槽位（位 0 是描述符自身，跳过），然后把组挂到目的
/// 分配器。
fn move_chain<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    head_blkno: u64,
    kind: SubAllocKind,
    new_slot: u16,
    dst: &mut Inode,
) -> Result<()> {
    let mut groups: Vec<MovedGroup> = Vec::new();
    let mut blkno = head_blkno;

    while blkno != 0 {
        let gd = read_group_desc(bdev, sb, blkno)?;
        let next = gd.next_group();
        groups.push(MovedGroup { blkno, gd });
        blkno = next;
    }

    let cr_pos = insert_chain_pos(dst, &dst.chain_list()?);

    for group in groups.iter_mut().rev() {
        let bits = group.gd.bits() as u32;

        // 逐段扫描占用区间，改写每个占用块的所属槽位
        let mut end = 1u32;
        while end < bits {
            let start = crate::bitmap::find_next_set(group.gd.bitmap(), bits, end);
            if start >= bits {
                break;
            }
            end = crate::bitmap::find_next_zero(group.gd.bitmap(), bits, start);

            for bit in start..end {
                let target = group.gd.block_of_bit(bit);
                change_sub_alloc_slot(bdev, sb, target, kind, new_slot)?;
            }
        }

        move_group(bdev, sb, dst, cr_pos, group)?;
    }

    Ok(())
}

/// 把一个被裁撤分配器的全部链迁入幸存分配器
///
/// 链按记录序的逆序迁移，第 `i` 条链迁给 `dst_blknos[i % n]`。
/// 全部迁完后把捐出方的记录清零并最后写回：这一步不可逆，
/// 严格排在所有组重新归属之后。
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock 引用
/// * `donor` - 被裁撤的分配器 inode
/// * `dst_blknos` - 幸存分配器的 inode 块号，下标即槽位
/// * `kind` - 子分配器类型
pub fn relink_allocator<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    donor: &mut Inode,
    dst_blknos: &[u64],
    kind: SubAllocKind,
) -> Result<()> {
    if dst_blknos.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "no destination allocators for migration",
        ));
    }
    if donor.bitmap_total() == 0 {
        log::debug!("[MIGRATE] allocator {} is empty, nothing to move", donor.blkno());
        return zero_donor(bdev, sb, donor);
    }

    let cl = donor.chain_list()?;

    for i in (0..cl.cl_next_free_rec).rev() {
        let head = cl.recs[i as usize].c_blkno;
        if head == 0 {
            continue;
        }

        let new_slot = (i as usize % dst_blknos.len()) as u16;
        let dst_blkno = dst_blknos[new_slot as usize];
        let mut dst = read_inode(bdev, sb, dst_blkno)?;

        log::debug!(
            "[MIGRATE] allocator {} chain {} -> allocator {} (slot {})",
            donor.blkno(),
            i,
            dst_blkno,
            new_slot
        );
        move_chain(bdev, sb, head, kind, new_slot, &mut dst)?;
    }

    zero_donor(bdev, sb, donor)
}

/// 清空捐出方分配器并写回
fn zero_donor<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    donor: &mut Inode,
) -> Result<()> {
    donor.set_bitmap_total(0);
    donor.set_bitmap_used(0);
    donor.set_clusters(0);
    donor.set_size(0);

    let mut cl = donor.chain_list()?;
    cl.cl_next_free_rec = 0;
    for rec in &mut cl.recs {
        *rec = ChainRec::default();
    }
    donor.set_chain_list(&cl);

    write_inode(bdev, sb, donor)
}
