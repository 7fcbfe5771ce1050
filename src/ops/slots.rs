//! 槽位数变更
//!
//! 收缩：从最高的槽位开始，一次裁一个。被裁槽位的 extent 分配
//! 器和 inode 分配器把名下的链迁给幸存槽位（第 `i` 条链给
//! `i % 新槽位数` 号），捐出方清零，然后 superblock 的槽位数减
//! 一落盘。一个槽位的完整序列是一个临界区；任何一步失败都让
//! 整个操作停在一个可由离线检查工具辨认的中间态。
//!
//! 增长：被裁过的槽位的分配器 inode 还留在系统表里（内容为
//! 空），直接复用，只改 superblock 的槽位数。系统表里没有的
//! 槽位不支持。

use crate::block::BlockDevice;
use crate::chain::{relink_allocator, SubAllocKind};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::read_inode;
use crate::session::TuneSession;
use alloc::vec::Vec;

/// 把卷的槽位数改成 `new_count`
///
/// 可重入：目标槽位数等于当前值时什么都不做。
pub fn change_slot_count<D: BlockDevice>(
    session: &mut TuneSession<D>,
    new_count: u16,
) -> Result<()> {
    let old = session.sb().max_slots();

    if new_count == 0 || new_count > CFS_MAX_SLOTS {
        return Err(Error::new(ErrorKind::InvalidInput, "slot count out of range"));
    }
    if new_count == old {
        log::debug!("[SLOTS] volume already has {} slots", old);
        return Ok(());
    }

    if new_count > old {
        grow(session, old, new_count)
    } else {
        shrink(session, old, new_count)
    }
}

fn grow<D: BlockDevice>(
    session: &mut TuneSession<D>,
    old: u16,
    new_count: u16,
) -> Result<()> {
    // 新槽位的分配器必须已经在系统表里（之前裁掉的可以复用）
    for slot in old..new_count {
        for kind in [CFS_SYS_EXTENT_ALLOC, CFS_SYS_INODE_ALLOC] {
            if session.lookup_system_inode(kind, slot).is_err() {
                log::error!("[SLOTS] no allocators in the system table for slot {}", slot);
                return Err(Error::new(
                    ErrorKind::Unsupported,
                    "system table has no allocators for the new slots",
                ));
            }
        }
    }

    session.critical(|s| {
        s.sb_mut().set_max_slots(new_count);
        s.write_super()
    })?;

    log::debug!("[SLOTS] grew from {} to {} slots", old, new_count);
    Ok(())
}

fn shrink<D: BlockDevice>(
    session: &mut TuneSession<D>,
    old: u16,
    new_count: u16,
) -> Result<()> {
    session.validate_volume()?;

    session.set_in_progress(CFS_TUNEFS_INPROG_REMOVE_SLOT)?;

    // 一次裁一个槽位，出问题时中间态最简单
    for removed in (new_count..old).rev() {
        let dst_ext = collect_destinations(session, CFS_SYS_EXTENT_ALLOC, new_count)?;
        let dst_ino = collect_destinations(session, CFS_SYS_INODE_ALLOC, new_count)?;
        let donor_ext = session.lookup_system_inode(CFS_SYS_EXTENT_ALLOC, removed)?;
        let donor_ino = session.lookup_system_inode(CFS_SYS_INODE_ALLOC, removed)?;

        log::debug!("[SLOTS] removing slot {}", removed);
        session.critical(|s| {
            let (bdev, sb) = s.parts();

            let mut donor = read_inode(bdev, sb, donor_ext)?;
            relink_allocator(bdev, sb, &mut donor, &dst_ext, SubAllocKind::ExtentAlloc)?;

            let mut donor = read_inode(bdev, sb, donor_ino)?;
            relink_allocator(bdev, sb, &mut donor, &dst_ino, SubAllocKind::InodeAlloc)?;

            // 所有组都重新归属之后才缩减槽位数
            s.sb_mut().set_max_slots(removed);
            s.write_super()
        })?;
    }

    session.clear_in_progress(CFS_TUNEFS_INPROG_REMOVE_SLOT)?;

    session.validate_volume()?;
    log::debug!("[SLOTS] shrank from {} to {} slots", old, new_count);
    Ok(())
}

fn collect_destinations<D: BlockDevice>(
    session: &mut TuneSession<D>,
    kind: u16,
    new_count: u16,
) -> Result<Vec<u64>> {
    let mut blknos = Vec::with_capacity(new_count as usize);
    for slot in 0..new_count {
        blknos.push(session.lookup_system_inode(kind, slot)?);
    }
    Ok(blknos)
}
