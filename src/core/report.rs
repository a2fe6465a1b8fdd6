//! 同步报告 - 汇总每个条目的处理结果

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// 同步状态
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    /// 完成，但有条目失败
    CompletedWithErrors,
}

/// 对单个条目执行的操作
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    /// 目标缺失，复制参考文件
    CopyFile,
    /// 大小不一致，重新复制
    RecopyFile,
    /// 大小一致，保持不动
    KeepFile,
    /// 目标多余的文件移入回收站
    TrashFile,
    /// 孤立目录中的文件移动到上层目录
    RelocateFile,
    /// 移动时目的地已有同名文件，移入回收站
    DiscardFile,
    /// 清空后的孤立目录移入回收站
    RemoveDir,
    /// 创建目标子目录
    CreateDir,
}

impl fmt::Display for ItemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CopyFile => "copy",
            Self::RecopyFile => "recopy",
            Self::KeepFile => "keep",
            Self::TrashFile => "trash",
            Self::RelocateFile => "relocate",
            Self::DiscardFile => "discard",
            Self::RemoveDir => "rmdir",
            Self::CreateDir => "mkdir",
        };
        write!(f, "{s}")
    }
}

/// 单个条目的处理结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOutcome {
    Success,
    /// 条目已消失等情况，跳过即可
    Skipped { reason: String },
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn skipped(reason: impl ToString) -> Self {
        Self::Skipped {
            reason: reason.to_string(),
        }
    }

    pub fn failed(reason: impl ToString) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// 未成功的条目
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub action: ItemAction,
    pub path: PathBuf,
    pub outcome: ItemOutcome,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub target_root: PathBuf,
    pub reference_root: PathBuf,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub dirs_created: u32,
    pub dirs_removed: u32,
    pub files_copied: u32,
    pub files_recopied: u32,
    pub files_unchanged: u32,
    pub files_trashed: u32,
    pub files_relocated: u32,
    pub files_discarded: u32,
    pub bytes_copied: u64,
    /// 孤立文件移动后的新位置，留给使用者检查
    pub relocated: Vec<PathBuf>,
    pub skipped: Vec<ItemReport>,
    pub failed: Vec<ItemReport>,
}

impl SyncReport {
    pub fn new(target_root: impl Into<PathBuf>, reference_root: impl Into<PathBuf>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target_root: target_root.into(),
            reference_root: reference_root.into(),
            start_time: Utc::now(),
            end_time: None,
            status: SyncStatus::Running,
            dirs_created: 0,
            dirs_removed: 0,
            files_copied: 0,
            files_recopied: 0,
            files_unchanged: 0,
            files_trashed: 0,
            files_relocated: 0,
            files_discarded: 0,
            bytes_copied: 0,
            relocated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// 记录一个条目的结果，成功时累加对应计数
    pub fn record(&mut self, action: ItemAction, path: &Path, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Success => match action {
                ItemAction::CopyFile => self.files_copied += 1,
                ItemAction::RecopyFile => self.files_recopied += 1,
                ItemAction::KeepFile => self.files_unchanged += 1,
                ItemAction::TrashFile => self.files_trashed += 1,
                ItemAction::RelocateFile => {
                    self.files_relocated += 1;
                    self.relocated.push(path.to_path_buf());
                }
                ItemAction::DiscardFile => self.files_discarded += 1,
                ItemAction::RemoveDir => self.dirs_removed += 1,
                ItemAction::CreateDir => self.dirs_created += 1,
            },
            ItemOutcome::Skipped { .. } => self.skipped.push(ItemReport {
                action,
                path: path.to_path_buf(),
                outcome,
            }),
            ItemOutcome::Failed { .. } => self.failed.push(ItemReport {
                action,
                path: path.to_path_buf(),
                outcome,
            }),
        }
    }

    pub fn add_bytes(&mut self, bytes: u64) {
        self.bytes_copied += bytes;
    }

    /// 结束本次同步，确定最终状态
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
        self.status = if self.failed.is_empty() {
            SyncStatus::Completed
        } else {
            SyncStatus::CompletedWithErrors
        };
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// 对目标树做出的修改数量（不含保持不动的文件）
    pub fn changes(&self) -> u32 {
        self.dirs_created
            + self.dirs_removed
            + self.files_copied
            + self.files_recopied
            + self.files_trashed
            + self.files_relocated
            + self.files_discarded
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
            .unwrap_or(0)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} <- {}",
            self.target_root.display(),
            self.reference_root.display()
        )?;
        writeln!(
            f,
            "  复制 {}, 重新复制 {}, 未变 {}, 删除 {}, 新建目录 {}, 移除目录 {} ({}, {} ms)",
            self.files_copied,
            self.files_recopied,
            self.files_unchanged,
            self.files_trashed,
            self.dirs_created,
            self.dirs_removed,
            format_size(self.bytes_copied),
            self.duration_ms()
        )?;
        if self.files_relocated > 0 || self.files_discarded > 0 {
            writeln!(
                f,
                "  孤立文件: 移动 {}, 同名丢弃 {}",
                self.files_relocated, self.files_discarded
            )?;
            for path in &self.relocated {
                writeln!(f, "    -> {}", path.display())?;
            }
        }
        for item in &self.skipped {
            if let ItemOutcome::Skipped { reason } = &item.outcome {
                writeln!(f, "  跳过 [{}] {}: {}", item.action, item.path.display(), reason)?;
            }
        }
        for item in &self.failed {
            if let ItemOutcome::Failed { reason } = &item.outcome {
                writeln!(f, "  失败 [{}] {}: {}", item.action, item.path.display(), reason)?;
            }
        }
        Ok(())
    }
}

/// 人类可读的字节数
pub fn format_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut idx = 0usize;

    while value >= 1024.0 && idx < SUFFIXES.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{:.0} {}", value, SUFFIXES[idx])
    } else {
        format!("{:.1} {}", value, SUFFIXES[idx])
    }
}
