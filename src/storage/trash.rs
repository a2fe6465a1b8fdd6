//! 可恢复删除 - 按 FreeDesktop Trash 规范移入回收站
//!
//! 回收站目录结构：
//!   <root>/files/<name>            被删除的文件或目录
//!   <root>/info/<name>.trashinfo   原始路径与删除时间

use crate::error::{Result, SyncError};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// trashinfo 文件扩展名
pub const TRASHINFO_EXTENSION: &str = ".trashinfo";

/// DeletionDate 字段的时间格式
pub const TRASHINFO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 同名条目的最大尝试次数
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// 删除结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashOutcome {
    /// 已移入回收站，`stored_as` 为回收站内的位置
    Trashed { stored_as: PathBuf },
    /// 路径已不存在，什么也没做
    Missing,
}

/// 可恢复删除接口
pub trait Trash: Send + Sync {
    /// 将文件或目录移入回收站；路径不存在时返回 [`TrashOutcome::Missing`]
    fn trash(&self, path: &Path) -> Result<TrashOutcome>;

    /// 回收站位置（用于日志和报告）
    fn location(&self) -> &Path;
}

/// FreeDesktop 规范的回收站
#[derive(Debug, Clone)]
pub struct FreedesktopTrash {
    root: PathBuf,
}

impl FreedesktopTrash {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 使用默认位置的回收站
    pub fn at_default_location() -> Self {
        Self::new(Self::default_location())
    }

    /// Linux 上为 `$XDG_DATA_HOME/Trash`（或 `~/.local/share/Trash`），
    /// 其他平台为应用数据目录下的 `Trash`
    pub fn default_location() -> PathBuf {
        if cfg!(target_os = "linux") {
            crate::dirs::data_dir()
                .map(|p| p.join("Trash"))
                .unwrap_or_else(|| PathBuf::from(".treemirror/Trash"))
        } else {
            crate::dirs::data_dir()
                .map(|p| p.join("treemirror").join("Trash"))
                .unwrap_or_else(|| PathBuf::from(".treemirror/Trash"))
        }
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.root.join("info")
    }

    fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.files_dir(), self.info_dir()] {
            fs::create_dir_all(&dir).map_err(|e| SyncError::trash_unavailable(&dir, e))?;
        }
        Ok(())
    }

    /// 独占创建 trashinfo 文件，返回 (回收站内路径, trashinfo 路径)
    fn reserve(&self, file_name: &str, original: &Path) -> Result<(PathBuf, PathBuf)> {
        let files_dir = self.files_dir();
        let info_dir = self.info_dir();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                file_name.to_string()
            } else {
                format!("{file_name}.{attempt}")
            };
            let stored = files_dir.join(&name);
            let info = info_dir.join(format!("{name}{TRASHINFO_EXTENSION}"));

            if fs::symlink_metadata(&stored).is_ok() {
                continue;
            }

            match OpenOptions::new().write(true).create_new(true).open(&info) {
                Ok(mut file) => {
                    file.write_all(trash_info(original).as_bytes())
                        .map_err(|e| SyncError::trash_unavailable(&info, e))?;
                    return Ok((stored, info));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SyncError::trash_unavailable(&info, e)),
            }
        }

        Err(SyncError::trash_unavailable(
            &self.root,
            format!("too many entries named {file_name}"),
        ))
    }
}

impl Trash for FreedesktopTrash {
    fn trash(&self, path: &Path) -> Result<TrashOutcome> {
        let is_dir = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata.is_dir(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TrashOutcome::Missing),
            Err(e) => return Err(SyncError::io("trash", path, e)),
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SyncError::InvalidPath(path.display().to_string()))?;

        self.ensure_dirs()?;
        let (stored, info) = self.reserve(&file_name, path)?;

        // 移动失败时删除已写入的 trashinfo
        let info_guard = scopeguard::guard(info, |info| {
            let _ = fs::remove_file(info);
        });

        match fs::rename(path, &stored) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("待删除路径已消失: {}", path.display());
                return Ok(TrashOutcome::Missing);
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!("跨设备移动，改为复制后删除: {}", path.display());
                if let Err(e) = move_by_copy(path, &stored, is_dir) {
                    warn!("移入回收站失败: {} - {}", path.display(), e);
                    let _ = if is_dir {
                        fs::remove_dir_all(&stored)
                    } else {
                        fs::remove_file(&stored)
                    };
                    return Err(SyncError::io("trash", path, e));
                }
            }
            Err(e) => return Err(SyncError::io("trash", path, e)),
        }

        let _ = scopeguard::ScopeGuard::into_inner(info_guard);
        debug!("已移入回收站: {} -> {}", path.display(), stored.display());
        Ok(TrashOutcome::Trashed { stored_as: stored })
    }

    fn location(&self) -> &Path {
        &self.root
    }
}

/// 生成 trashinfo 内容
fn trash_info(original: &Path) -> String {
    let deleted_at = chrono::Local::now().format(TRASHINFO_TIME_FORMAT);
    format!(
        "[Trash Info]\nPath={}\nDeletionDate={}\n",
        encode_path(original),
        deleted_at
    )
}

/// 按路径段做百分号编码，统一以 `/` 连接
fn encode_path(path: &Path) -> String {
    let mut prefix = String::new();
    let mut absolute = false;
    let mut segments = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir => absolute = true,
            Component::CurDir => segments.push(".".to_string()),
            Component::ParentDir => segments.push("..".to_string()),
            Component::Normal(name) => {
                segments.push(urlencoding::encode(&name.to_string_lossy()).into_owned())
            }
        }
    }

    let root = if absolute { "/" } else { "" };
    format!("{prefix}{root}{}", segments.join("/"))
}

/// 跨设备时先复制再删除源
fn move_by_copy(from: &Path, to: &Path, is_dir: bool) -> io::Result<()> {
    if !is_dir {
        fs::copy(from, to)?;
        return fs::remove_file(from);
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let dest = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest)?;
        }
    }

    fs::remove_dir_all(from)
}
