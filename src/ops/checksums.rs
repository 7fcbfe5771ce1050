//! 元数据校验和特性的开关
//!
//! 开启是全卷改写：扫描所有 inode 把要重写的元数据块暂存进写
//! 缓存，给缺尾部的目录装上尾部结构（这一步可能分配新块，所以
//! 链式分配器的块推迟到所有安装完成后再收集），然后在内存里置
//! 上特性位、把暂存块整批下刷（此时每个写回例程都会计算校验
//! 和），最后写 superblock。superblock 不进缓存，永远最后写。
//!
//! 关闭只清特性位：尾部结构留在目录块里，对不识别它的遍历代码
//! 就是一个死目录项，无害。

use crate::block::BlockDevice;
use crate::cache::{BlockKind, WriteCache};
use crate::consts::*;
use crate::dir::{install_dir_trailer, prepare_dir_trailer, TrailerContext};
use crate::error::{Error, ErrorKind, Result};
use crate::extent::{extent_block_for, extent_iterate_meta};
use crate::group::read_group_desc;
use crate::inode::{read_inode, Inode};
use crate::session::TuneSession;
use alloc::vec::Vec;

/// 开启扫描的全部状态
struct AddCsumContext {
    cache: WriteCache,
    /// 缺尾部的目录，待安装
    dirs: Vec<TrailerContext>,
    /// 链式分配器 inode，最后收集
    chains: Vec<u64>,
    /// 目录尾部安装需要的新块数
    clusters_needed: u64,
}

/// 把一个目录的数据块和 extent 块全部暂存
fn stage_dir_data<D: BlockDevice>(
    session: &mut TuneSession<D>,
    di: &Inode,
    cache: &mut WriteCache,
) -> Result<()> {
    let (bdev, sb) = session.parts();

    for logical in 0..di.clusters() {
        let phys = extent_block_for(bdev, sb, di, logical)?;
        let buf = bdev.read_block_vec(phys)?;
        cache.insert(phys, buf, BlockKind::DirBlock)?;
    }

    extent_iterate_meta(bdev, sb, di, |_bdev, eb| {
        cache.insert(eb.blkno(), eb.buf.clone(), BlockKind::ExtentBlock)
    })
}

/// 扫描所有 inode，填充暂存缓存和目录安装清单
///
/// 结束时做空间预检：尾部安装需要的块数超过空闲块数时整个操作
/// 中止，盘上一个字节都没改。
fn find_blocks<D: BlockDevice>(
    session: &mut TuneSession<D>,
    ctxt: &mut AddCsumContext,
) -> Result<()> {
    // 链式分配器的块最后处理：目录尾部安装还会从它们分配
    for e in session.system_table()? {
        if e.e_blkno == 0 {
            continue;
        }
        if matches!(e.e_type, CFS_SYS_GLOBAL_BITMAP | CFS_SYS_EXTENT_ALLOC | CFS_SYS_INODE_ALLOC) {
            ctxt.chains.push(e.e_blkno);
        }
    }

    for blkno in session.collect_inode_blocks()? {
        let (bdev, sb) = session.parts();
        let di = read_inode(bdev, sb, blkno)?;

        // 系统表已经记下了链式分配器
        if di.is_chain() {
            continue;
        }

        ctxt.cache.insert(blkno, di.raw().to_vec(), BlockKind::Inode)?;

        if di.is_dir() {
            match prepare_dir_trailer(bdev, sb, &di)? {
                Some(tc) => {
                    log::debug!(
                        "[CSUM] directory {} needs {} more blocks",
                        tc.dir_blkno(),
                        tc.blocks_needed()
                    );
                    ctxt.clusters_needed += tc.blocks_needed();
                    ctxt.dirs.push(tc);
                }
                // 已有尾部的目录现在就可以收块
                None => stage_dir_data(session, &di, &mut ctxt.cache)?,
            }
        } else {
            let (bdev, sb) = session.parts();
            extent_iterate_meta(bdev, sb, &di, |_bdev, eb| {
                ctxt.cache.insert(eb.blkno(), eb.buf.clone(), BlockKind::ExtentBlock)
            })?;
        }
    }

    let free = session.free_clusters()?;
    log::debug!(
        "[CSUM] {} clusters free, {} needed for directory trailers",
        free,
        ctxt.clusters_needed
    );
    if (free as u64) < ctxt.clusters_needed {
        return Err(Error::new(
            ErrorKind::NoSpace,
            "not enough free clusters to add directory trailers",
        ));
    }

    Ok(())
}

/// 给清单里的每个目录装尾部
///
/// 每个目录的安装是一个临界区。装完后刷新该目录 inode 的暂存
/// 副本（安装改了大小和映射），再把现在不会再变的目录数据块
/// 收进缓存。
fn install_trailers<D: BlockDevice>(
    session: &mut TuneSession<D>,
    ctxt: &mut AddCsumContext,
) -> Result<()> {
    for tc in core::mem::take(&mut ctxt.dirs) {
        let dir_blkno = tc.dir_blkno();
        log::debug!("[CSUM] installing trailers for directory {}", dir_blkno);

        let di = session.critical(|s| {
            let global_blkno = s.lookup_system_inode(CFS_SYS_GLOBAL_BITMAP, 0)?;
            let (bdev, sb) = s.parts();
            let mut galloc = read_inode(bdev, sb, global_blkno)?;
            let mut di = read_inode(bdev, sb, dir_blkno)?;
            install_dir_trailer(bdev, sb, &mut galloc, &mut di, tc)?;
            Ok(di)
        })?;

        // 安装动了目录 inode，暂存副本跟着更新
        let staged = ctxt.cache.lookup_mut(dir_blkno).ok_or(Error::new(
            ErrorKind::Internal,
            "directory inode vanished from the write cache",
        ))?;
        staged.buf.copy_from_slice(di.raw());

        stage_dir_data(session, &di, &mut ctxt.cache)?;
    }

    Ok(())
}

/// 收集所有链式分配器的 inode 和组描述符
fn find_chain_blocks<D: BlockDevice>(
    session: &mut TuneSession<D>,
    ctxt: &mut AddCsumContext,
) -> Result<()> {
    for alloc_blkno in core::mem::take(&mut ctxt.chains) {
        let (bdev, sb) = session.parts();
        let alloc = read_inode(bdev, sb, alloc_blkno)?;
        ctxt.cache.insert(alloc_blkno, alloc.raw().to_vec(), BlockKind::Inode)?;

        let mut group_blocks = Vec::new();
        crate::chain::chain_iterate(bdev, sb, &alloc, |_bdev, gd_blkno, _chain| {
            group_blocks.push(gd_blkno);
            Ok(())
        })?;

        for gd_blkno in group_blocks {
            let (bdev, sb) = session.parts();
            let gd = read_group_desc(bdev, sb, gd_blkno)?;
            ctxt.cache.insert(gd_blkno, gd.buf, BlockKind::GroupDesc)?;
        }
    }

    Ok(())
}

/// 开启元数据校验和
///
/// 可重入：特性已开启时什么都不做。
pub fn enable_metadata_csum<D: BlockDevice>(session: &mut TuneSession<D>) -> Result<()> {
    if session.sb().meta_csum() {
        log::debug!("[CSUM] metadata checksums already enabled");
        return Ok(());
    }

    session.validate_volume()?;

    let mut ctxt = AddCsumContext {
        cache: WriteCache::new(),
        dirs: Vec::new(),
        chains: Vec::new(),
        clusters_needed: 0,
    };

    find_blocks(session, &mut ctxt)?;

    session.set_in_progress(CFS_TUNEFS_INPROG_DIR_TRAILER)?;
    install_trailers(session, &mut ctxt)?;
    session.clear_in_progress(CFS_TUNEFS_INPROG_DIR_TRAILER)?;

    // 分配都结束了，现在收链式分配器
    find_chain_blocks(session, &mut ctxt)?;

    // 在内存里置上特性位，所有暂存块带着校验和落盘
    session.sb_mut().set_incompat_feature(CFS_FEATURE_INCOMPAT_META_CSUM);
    {
        let (bdev, sb) = session.parts();
        ctxt.cache.flush(bdev, sb)?;
    }
    ctxt.cache.clear();

    session.critical(|s| s.write_super())?;

    session.validate_volume()?;
    log::debug!("[CSUM] metadata checksums enabled");
    Ok(())
}

/// 关闭元数据校验和
///
/// 可重入：特性未开启时什么都不做。
pub fn disable_metadata_csum<D: BlockDevice>(session: &mut TuneSession<D>) -> Result<()> {
    if !session.sb().meta_csum() {
        log::debug!("[CSUM] metadata checksums not enabled");
        return Ok(());
    }

    session.sb_mut().clear_incompat_feature(CFS_FEATURE_INCOMPAT_META_CSUM);
    session.critical(|s| s.write_super())?;

    log::debug!("[CSUM] metadata checksums disabled");
    Ok(())
}
