//! 目录操作
//!
//! 目录数据块是一串变长目录项。卷开启了依赖尾部的特性后，
//! 每个目录块尾部的固定偏移处还有一个 64 字节的尾部结构，
//! 目录项不得越过它。

mod block;
mod entry;
mod install;

pub use block::{
    block_has_trailer, dir_has_trailer, dir_trailer_blk_off, dir_trailer_check_off,
    init_dir_trailer, read_dir_block, write_dir_block_raw,
};
pub use entry::DirEntryCursor;
pub use install::{install_dir_trailer, prepare_dir_trailer, TrailerContext};
