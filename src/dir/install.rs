//! 目录尾部安装
//!
//! 给一个目录的每个数据块腾出尾部结构的位置。逐目录的状态机：
//!
//! ```text
//! 扫描 → (无需改动 | 需要尾部) → [扩块] → 重写 → 提交
//! ```
//!
//! 扫描（[`prepare_dir_trailer`]）逐块找出最后一个可以留在尾部
//! 偏移之前的活项（last-keep），其后的活项全部要搬进新块，并
//! 算出搬迁需要的字节数和新块数。所有块都已带尾部时返回
//! `None`，整个操作不产生任何写。
//!
//! 安装（[`install_dir_trailer`]）按严格顺序提交：先写新块，
//! 再写带新大小的 inode，最后写改动过的原块。这个顺序是关键：
//! 在新块落盘之后、inode 更新之前中断，只会留下重复的目录项
//! （无害，可修复）；在原块改写之前中断，只是尾部还没装上。
//! 任何顺序都不会丢数据。

use crate::block::{BlockDev, BlockDevice};
use crate::chain::alloc_blocks;
use crate::consts::*;
use crate::dir::block::{block_has_trailer, dir_trailer_blk_off, init_dir_trailer, write_dir_block_raw};
use crate::dir::entry::DirEntryCursor;
use crate::error::{CorruptKind, Error, ErrorKind, Result};
use crate::extent::{extent_append_block, extent_block_for};
use crate::inode::{read_inode, write_inode, Inode};
use crate::superblock::Superblock;
use crate::types::DirEntryHeader;
use alloc::vec;
use alloc::vec::Vec;

/// 扫描后的一个目录块
#[derive(Debug)]
struct ScannedBlock {
    blkno: u64,
    buf: Vec<u8>,
    /// 最后一个留在原块的活项（偏移和头部）
    last_keep: Option<(usize, DirEntryHeader)>,
    /// 要搬走的活项，按原顺序
    moved: Vec<(usize, DirEntryHeader)>,
}

/// 一个目录的尾部安装上下文
///
/// 由 [`prepare_dir_trailer`] 创建，安装成功或出错后销毁。
#[derive(Debug)]
pub struct TrailerContext {
    dir_blkno: u64,
    bytes_needed: u64,
    blocks_needed: u64,
    blocks: Vec<ScannedBlock>,
}

impl TrailerContext {
    /// 目录 inode 块号
    pub fn dir_blkno(&self) -> u64 {
        self.dir_blkno
    }

    /// 搬迁需要的字节数
    pub fn bytes_needed(&self) -> u64 {
        self.bytes_needed
    }

    /// 需要新分配的目录块数
    pub fn blocks_needed(&self) -> u64 {
        self.blocks_needed
    }
}

/// 扫描一个目录，决定尾部安装要做什么
///
/// 返回 `None` 表示所有块都已带尾部，无需任何改动（可重入）。
/// 项的跨度非法对整个目录是致命错误。
pub fn prepare_dir_trailer<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    di: &Inode,
) -> Result<Option<TrailerContext>> {
    if !di.is_dir() {
        return Err(Error::new(ErrorKind::InvalidInput, "inode is not a directory"));
    }

    let block_size = sb.block_size() as usize;
    let toff = dir_trailer_blk_off(block_size);

    let mut tc = TrailerContext {
        dir_blkno: di.blkno(),
        bytes_needed: 0,
        blocks_needed: 0,
        blocks: Vec::new(),
    };

    for logical in 0..di.clusters() {
        let phys = extent_block_for(bdev, sb, di, logical)?;
        let buf = bdev.read_block_vec(phys)?;

        if block_has_trailer(&buf, phys) {
            continue;
        }

        let mut last_keep = None;
        let mut moved = Vec::new();
        let mut cursor = DirEntryCursor::new(&buf, phys);

        while let Some((offset, hdr)) = cursor.next_entry()? {
            if !hdr.is_live() {
                continue;
            }
            let used = hdr.used_len();
            if used > toff {
                return Err(Error::corrupt(
                    CorruptKind::BadDirEntry,
                    phys,
                    "directory entry cannot fit before the trailer offset",
                ));
            }
            if offset + used <= toff {
                last_keep = Some((offset, hdr));
            } else {
                moved.push((offset, hdr));
            }
        }

        for &(_, hdr) in &moved {
            tc.bytes_needed += hdr.used_len() as u64;
        }
        tc.blocks.push(ScannedBlock {
            blkno: phys,
            buf,
            last_keep,
            moved,
        });
    }

    if tc.blocks.is_empty() {
        log::debug!("[TRAILER] directory {} already has trailers", di.blkno());
        return Ok(None);
    }

    // 块预算：把要搬的项按顺序虚拟装箱，装不进当前新块剩余
    // 空间的项开下一个块
    let mut rem = 0usize;
    for sblk in &tc.blocks {
        for &(_, hdr) in &sblk.moved {
            let used = hdr.used_len();
            if used > rem {
                tc.blocks_needed += 1;
                rem = toff;
            }
            rem -= used;
        }
    }

    log::debug!(
        "[TRAILER] directory {} needs {} bytes / {} blocks for {} dirblocks",
        di.blkno(),
        tc.bytes_needed,
        tc.blocks_needed,
        tc.blocks.len()
    );

    Ok(Some(tc))
}

/// 延展一个块里最后放入的项，使其跨度到尾部偏移为止
fn seal_tail(buf: &mut [u8], placed: (usize, DirEntryHeader), toff: usize) -> u16 {
    let (offset, mut hdr) = placed;
    hdr.rec_len = (toff - offset) as u16;
    hdr.encode(buf, offset);
    (hdr.rec_len as usize - hdr.used_len()) as u16
}

/// 给目录安装尾部结构
///
/// 扩块、重写、提交三步见模块文档。扩块失败（空间不足）时
/// 没有任何目录块被改写。
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock 引用
/// * `global_alloc` - 全局位图分配器 inode（扩块来源）
/// * `di` - 目录 inode，安装后持有最新内容
/// * `tc` - 本目录的扫描结果
pub fn install_dir_trailer<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    global_alloc: &mut Inode,
    di: &mut Inode,
    tc: TrailerContext,
) -> Result<()> {
    if tc.dir_blkno != di.blkno() {
        return Err(Error::new(
            ErrorKind::Internal,
            "trailer context does not belong to this directory",
        ).with_blkno(di.blkno()));
    }

    let block_size = sb.block_size() as usize;
    let toff = dir_trailer_blk_off(block_size);
    let mut tc = tc;

    // ===== 扩块 =====

    let mut new_blocks: Vec<(u64, Vec<u8>)> = Vec::new();
    if tc.blocks_needed > 0 {
        let picked = alloc_blocks(bdev, sb, global_alloc, tc.blocks_needed)?;
        for &blkno in &picked {
            extent_append_block(di, blkno)?;
        }
        write_inode(bdev, sb, di)?;
        // 扩块可能动了 inode 的其他字段，重新读一遍
        *di = read_inode(bdev, sb, tc.dir_blkno)?;

        for &blkno in &picked {
            // 新块先是一个跨到尾部偏移的死项，加上尾部结构
            let mut buf = vec![0u8; block_size];
            DirEntryHeader {
                inode: 0,
                rec_len: toff as u16,
                name_len: 0,
                file_type: 0,
            }
            .encode(&mut buf, 0);
            init_dir_trailer(&mut buf, blkno, di.blkno(), toff as u16);
            new_blocks.push((blkno, buf));
        }
    }

    // ===== 重写（内存中） =====

    let mut cur = 0usize;
    let mut cur_off = 0usize;
    let mut last_placed: Option<(usize, DirEntryHeader)> = None;

    for sblk in &tc.blocks {
        for &(offset, hdr) in &sblk.moved {
            let used = hdr.used_len();

            if toff - cur_off < used {
                let placed = last_placed.take().ok_or(Error::new(
                    ErrorKind::Internal,
                    "moved entry larger than an empty directory block",
                ))?;
                let free = seal_tail(&mut new_blocks[cur].1, placed, toff);
                let (blkno, buf) = &mut new_blocks[cur];
                init_dir_trailer(buf, *blkno, di.blkno(), free);
                cur += 1;
                cur_off = 0;
            }
            if cur >= new_blocks.len() {
                return Err(Error::new(
                    ErrorKind::Internal,
                    "trailer context block budget exhausted",
                ).with_blkno(di.blkno()));
            }

            let dst = &mut new_blocks[cur].1;
            dst[cur_off..cur_off + used].copy_from_slice(&sblk.buf[offset..offset + used]);
            let mut placed = hdr;
            placed.rec_len = used as u16;
            placed.encode(dst, cur_off);

            last_placed = Some((cur_off, placed));
            cur_off += used;
        }
    }

    if let Some(placed) = last_placed.take() {
        let free = seal_tail(&mut new_blocks[cur].1, placed, toff);
        let (blkno, buf) = &mut new_blocks[cur];
        init_dir_trailer(buf, *blkno, di.blkno(), free);
    }

    for sblk in &mut tc.blocks {
        let free = match sblk.last_keep {
            Some(placed) => seal_tail(&mut sblk.buf, placed, toff),
            None => {
                // 块里一个活项都留不下：整块变成一个死项
                DirEntryHeader {
                    inode: 0,
                    rec_len: toff as u16,
                    name_len: 0,
                    file_type: 0,
                }
                .encode(&mut sblk.buf, 0);
                toff as u16
            }
        };
        init_dir_trailer(&mut sblk.buf, sblk.blkno, di.blkno(), free);
    }

    // ===== 提交：新块 → inode（新大小）→ 原块 =====

    for (blkno, buf) in &mut new_blocks {
        write_dir_block_raw(bdev, sb, *blkno, buf)?;
    }

    di.set_size(di.clusters() as u64 * block_size as u64);
    write_inode(bdev, sb, di)?;

    for sblk in &mut tc.blocks {
        write_dir_block_raw(bdev, sb, sblk.blkno, &mut sblk.buf)?;
    }

    log::debug!(
        "[TRAILER] directory {}: {} blocks rewritten, {} blocks added",
        di.blkno(),
        tc.blocks.len(),
        new_blocks.len()
    );

    Ok(())
}
