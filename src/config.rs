//! 应用配置模块
//!
//! 所有配置保存在同一个 `config.json` 中，按小节（`sync`、`log`）读写。

use crate::core::{IgnoreRules, SyncConfig, DEFAULT_IGNORED_NAMES};
use crate::error::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 两侧都忽略的名称（不区分大小写）
    #[serde(default = "default_ignore_names")]
    pub ignore_names: Vec<String>,
    /// 两侧都忽略的通配符模式
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// 目标根目录不存在时自动创建
    #[serde(default = "default_auto_create_target")]
    pub auto_create_target: bool,
    /// 回收站位置，未设置时使用系统默认位置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash_dir: Option<PathBuf>,
}

fn default_ignore_names() -> Vec<String> {
    DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect()
}

fn default_auto_create_target() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            ignore_names: default_ignore_names(),
            ignore_patterns: Vec::new(),
            auto_create_target: default_auto_create_target(),
            trash_dir: None,
        }
    }
}

impl SyncSettings {
    /// 从配置目录加载
    pub fn load(config_dir: &Path) -> Self {
        Self::load_from(&config_dir.join(CONFIG_FILE))
    }

    /// 从指定配置文件加载，文件缺失或无法解析时使用默认值
    pub fn load_from(config_file: &Path) -> Self {
        read_section(config_file, "sync").unwrap_or_default()
    }

    /// 保存到配置目录
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        write_section(&config_dir.join(CONFIG_FILE), "sync", self)
    }

    /// 转换为引擎配置
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            ignore: IgnoreRules::new(&self.ignore_names, &self.ignore_patterns),
            auto_create_target: self.auto_create_target,
        }
    }
}

/// 读取配置文件中的一个小节
pub(crate) fn read_section<T: DeserializeOwned>(config_file: &Path, key: &str) -> Option<T> {
    let content = fs::read_to_string(config_file).ok()?;
    let config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    let section = config.get(key)?;
    match serde_json::from_value::<T>(section.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("配置小节 {} 无法解析，使用默认值: {}", key, e);
            None
        }
    }
}

/// 写入配置文件中的一个小节，保留其他小节
pub(crate) fn write_section<T: Serialize>(config_file: &Path, key: &str, value: &T) -> Result<()> {
    // 读取现有配置
    let mut config: serde_json::Value = match fs::read_to_string(config_file) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[key] = serde_json::to_value(value).map_err(|e| SyncError::Config(e.to_string()))?;

    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::io("create_dir_all", parent, e))?;
    }
    let content =
        serde_json::to_string_pretty(&config).map_err(|e| SyncError::Config(e.to_string()))?;
    fs::write(config_file, content).map_err(|e| SyncError::io("write", config_file, e))
}
