//! 块设备抽象
//!
//! 提供块设备接口和块级 I/O 操作。
//!
//! `device.rs` 定义 [`BlockDevice`] trait 和 [`BlockDev`] 包装器；
//! `io.rs` 提供读写路径：读优先走扫描读缓存，写采用写穿（先落盘，
//! 再更新缓存），引擎的正确性从不依赖缓存内容。

mod device;
mod io;

pub use device::{BlockDev, BlockDevice, DEFAULT_READ_CACHE, LARGE_READ_CACHE};
