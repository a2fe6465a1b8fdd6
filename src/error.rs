//! 错误类型

use std::io;
use std::path::PathBuf;

/// 同步过程中可能出现的错误
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// 文件系统 I/O 失败
    #[error("{op} 失败: {path}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 路径格式不合法（空路径、混用分隔符等）
    #[error("无效路径: {0}")]
    InvalidPath(String),

    /// 参考目录不存在或不是目录
    #[error("参考目录不存在或不可读: {0}")]
    ReferenceMissing(PathBuf),

    /// 目标目录不存在且未开启自动创建
    #[error("目标目录不存在: {0}")]
    TargetMissing(PathBuf),

    /// 目标目录与参考目录相同或互相嵌套
    #[error("目标目录与参考目录重叠: {target} <-> {reference}")]
    OverlappingRoots { target: PathBuf, reference: PathBuf },

    /// 回收站不可用（无法创建或写入）
    #[error("回收站不可用: {path} ({reason})")]
    TrashUnavailable { path: PathBuf, reason: String },

    /// 配置文件无法解析或保存
    #[error("配置错误: {0}")]
    Config(String),
}

impl SyncError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn trash_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::TrashUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// 底层 I/O 错误类型（非 I/O 错误返回 None）
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// 路径已不存在（被外部删除）
    pub fn is_not_found(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::NotFound)
    }
}

/// 库内统一的 Result 别名
pub type Result<T> = std::result::Result<T, SyncError>;
