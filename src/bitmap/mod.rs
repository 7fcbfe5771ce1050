//! 位图操作
//!
//! 分配组位图上的位级操作。

mod ops;

pub use ops::*;
