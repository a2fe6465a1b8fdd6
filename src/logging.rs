//! 日志模块 - 提供文件日志和大小管理功能

use crate::config::{read_section, write_section, CONFIG_FILE};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// 日志文件名
pub const LOG_FILE: &str = "treemirror.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写入日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置目录加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        Self::load_from(&config_dir.join(CONFIG_FILE))
    }

    pub fn load_from(config_file: &Path) -> Self {
        let mut config: Self = read_section(config_file, "log").unwrap_or_default();
        // 限制范围 1-100 MB
        config.max_size_mb = config.max_size_mb.clamp(1, 100);
        config
    }

    /// 保存日志配置
    pub fn save(&self, config_dir: &Path) -> crate::error::Result<()> {
        write_section(&config_dir.join(CONFIG_FILE), "log", self)
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        parse_level(&self.level).unwrap_or(tracing::Level::INFO)
    }
}

/// 解析日志级别名称
pub fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

/// 带大小限制的日志写入器
///
/// 超过上限时把当前文件改名为 `treemirror.log.old`（覆盖旧备份）后重新打开。
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE);
        let max_size = (max_size_mb as u64) * 1024 * 1024;
        let writer = Self::open_file(&file_path, max_size)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
        if Self::over_limit(file_path, max_size) {
            Self::rotate_log(file_path)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(file_path)?;
        Ok(BufWriter::new(file))
    }

    fn over_limit(file_path: &Path, max_size: u64) -> bool {
        fs::metadata(file_path)
            .map(|m| m.len() > max_size)
            .unwrap_or(false)
    }

    /// 轮转日志文件
    fn rotate_log(file_path: &Path) -> io::Result<()> {
        let backup_path = file_path.with_extension("log.old");
        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(file_path, &backup_path)
    }

    fn lock(&self) -> MutexGuard<'_, Option<BufWriter<File>>> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 超过上限时关闭当前文件、轮转并重新打开
    fn rotate_if_needed(&self) -> io::Result<()> {
        if !Self::over_limit(&self.file_path, self.max_size) {
            return Ok(());
        }

        let mut guard = self.lock();
        if let Some(mut w) = guard.take() {
            let _ = w.flush();
        }
        Self::rotate_log(&self.file_path)?;
        *guard = Some(Self::open_file(&self.file_path, self.max_size)?);
        Ok(())
    }
}

/// 单次写入使用的句柄
pub struct LogWriter {
    inner: SizeRotatingWriter,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = {
            let mut guard = self.inner.lock();
            let writer = guard
                .as_mut()
                .ok_or_else(|| io::Error::other("log writer not available"))?;
            let written = writer.write(buf)?;
            writer.flush()?;
            written
        };

        let _ = self.inner.rotate_if_needed();
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.lock().as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            inner: self.clone(),
        }
    }
}

/// 日志目录：配置目录下的 `logs`
pub fn get_log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("DEBUG"), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level("loud"), None);
        let config = LogConfig {
            level: "nonsense".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn max_size_is_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"log": {"maxSizeMb": 5000, "level": "warn"}}"#,
        )
        .unwrap();
        let config = LogConfig::load(dir.path());
        assert_eq!(config.max_size_mb, 100);
        assert_eq!(config.level, "warn");
        assert!(config.enabled);
    }

    #[test]
    fn writer_appends_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SizeRotatingWriter::new(dir.path(), 1).unwrap();
        writer.make_writer().write_all(b"hello\n").unwrap();
        writer.make_writer().write_all(b"world\n").unwrap();

        let content = fs::read_to_string(writer.file_path()).unwrap();
        assert_eq!(content, "hello\nworld\n");
    }

    #[test]
    fn oversized_log_is_rotated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        fs::write(&path, vec![b'x'; 2 * 1024 * 1024]).unwrap();

        let writer = SizeRotatingWriter::new(dir.path(), 1).unwrap();
        writer.make_writer().write_all(b"fresh\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
        assert!(dir.path().join("treemirror.log.old").exists());
    }
}
