//! 错误类型定义
//!
//! 提供调优引擎所有操作的错误类型。
//!
//! 结构性损坏错误会携带出错的块号和具体的不匹配类别
//! （见 [`CorruptKind`]），便于离线检查工具定位问题。

use core::fmt;

/// 调优引擎操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
    blkno: Option<u64>,
    corrupt: Option<CorruptKind>,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 磁盘结构损坏
    Corrupted,
    /// 空间不足
    NoSpace,
    /// 不存在
    NotFound,
    /// 只读卷
    ReadOnly,
    /// 不支持的操作
    Unsupported,
    /// 无效状态
    InvalidState,
    /// 内部前置条件被破坏（不可由用户恢复）
    Internal,
}

/// 结构性损坏的具体类别
///
/// 第一个检测到的不一致决定错误的类别，引擎不做任何修复。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CorruptKind {
    /// 块签名错误
    BadSignature,
    /// 块校验和不匹配
    BadChecksum,
    /// 组描述符的父分配器引用与所在链不符
    GroupParentMismatch,
    /// 组描述符的链下标与所在链不符
    GroupChainMismatch,
    /// 位图重算的空闲位数与记录值不符
    GroupFreeMismatch,
    /// 组总位数超出物理容量
    GroupBitsOverCapacity,
    /// 空闲位数不少于总位数
    GroupFreeOverTotal,
    /// 链记录总位数与各组之和不符
    ChainTotalMismatch,
    /// 链记录空闲位数与各组之和不符
    ChainFreeMismatch,
    /// 分配器总计数与各链之和不符
    AllocTotalMismatch,
    /// 目录项长度非法（错位或与名字长度矛盾）
    BadDirEntry,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            blkno: None,
            corrupt: None,
        }
    }

    /// 创建携带块号的结构损坏错误
    pub const fn corrupt(kind: CorruptKind, blkno: u64, message: &'static str) -> Self {
        Self {
            kind: ErrorKind::Corrupted,
            message,
            blkno: Some(blkno),
            corrupt: Some(kind),
        }
    }

    /// 为错误补充出错的块号
    pub const fn with_blkno(mut self, blkno: u64) -> Self {
        self.blkno = Some(blkno);
        self
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 获取出错的块号（如果有）
    pub const fn blkno(&self) -> Option<u64> {
        self.blkno
    }

    /// 获取损坏类别（如果是结构损坏）
    pub const fn corrupt_kind(&self) -> Option<CorruptKind> {
        self.corrupt
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.corrupt, self.blkno) {
            (Some(ck), Some(blkno)) => {
                write!(f, "{:?}: {} ({:?} at block {})", self.kind, self.message, ck, blkno)
            }
            (None, Some(blkno)) => {
                write!(f, "{:?}: {} (block {})", self.kind, self.message, blkno)
            }
            _ => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
