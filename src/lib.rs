use std::path::PathBuf;

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::core::{
    compare_trees, synchronize, synchronize_paths, Directory, FileEntry, IgnoreRules, MirrorEngine,
    ProgressEvent, ProgressSink, SyncConfig, SyncReport, SyncStatus,
};
pub use config::SyncSettings;
pub use error::{Result, SyncError};
pub use storage::{FreedesktopTrash, LocalStorage, Storage, Trash, TrashOutcome};

/// 应用配置目录（配置文件与日志）
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("treemirror"))
        .unwrap_or_else(|| PathBuf::from(".treemirror"))
}

/// 平台目录
pub mod dirs {
    use std::path::PathBuf;

    fn home() -> Option<PathBuf> {
        std::env::var_os("HOME").map(PathBuf::from)
    }

    /// 非空的环境变量
    fn env_dir(key: &str) -> Option<PathBuf> {
        std::env::var_os(key)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            env_dir("APPDATA")
        } else if cfg!(target_os = "macos") {
            home().map(|h| h.join("Library").join("Application Support"))
        } else {
            // Linux
            env_dir("XDG_CONFIG_HOME").or_else(|| home().map(|h| h.join(".config")))
        }
    }

    pub fn data_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            env_dir("LOCALAPPDATA")
        } else if cfg!(target_os = "macos") {
            home().map(|h| h.join("Library").join("Application Support"))
        } else {
            // Linux
            env_dir("XDG_DATA_HOME").or_else(|| home().map(|h| h.join(".local").join("share")))
        }
    }
}
