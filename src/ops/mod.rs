//! 特性变更操作
//!
//! 把底层原语（写缓存、目录尾部安装、链迁移、一致性校验）
//! 串成完整的卷变更。交互确认和进度显示都在调用方，这里只有
//! 引擎本体。

mod checksums;
mod slots;

pub use checksums::{disable_metadata_csum, enable_metadata_csum};
pub use slots::change_slot_count;
