//! 进度事件 - 可选的观测接口，是否接入不影响同步结果

use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::trace;

/// 同步过程中的单步事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// 进入一对同位置目录
    EnterPair { target: PathBuf, reference: PathBuf },
    /// 目标侧没有对应目录，整体复制参考目录
    CopyFolder { target: PathBuf, reference: PathBuf },
    /// 对齐一层目录中的文件
    ReconcileFiles { target: PathBuf, reference: PathBuf },
    /// 清空孤立子目录
    Drain { subtree: PathBuf, destination: PathBuf },
    /// 复制文件
    CopyFile { from: PathBuf, to: PathBuf },
    /// 孤立文件移动到上层目录
    Relocate { from: PathBuf, to: PathBuf },
    /// 移入回收站
    Trash { path: PathBuf },
}

/// 进度接收端
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// 输出为 trace 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::EnterPair { target, reference } => {
                trace!("traverse_folders    {}  |  {}", target.display(), reference.display())
            }
            ProgressEvent::CopyFolder { target, reference } => {
                trace!("copy_entire_folder  {}  |  {}", target.display(), reference.display())
            }
            ProgressEvent::ReconcileFiles { target, reference } => {
                trace!("copy_files          {}  |  {}", target.display(), reference.display())
            }
            ProgressEvent::Drain {
                subtree,
                destination,
            } => trace!("empty_subdirs       {}  |  {}", subtree.display(), destination.display()),
            ProgressEvent::CopyFile { from, to } => {
                trace!("copy                {} -> {}", from.display(), to.display())
            }
            ProgressEvent::Relocate { from, to } => {
                trace!("move                {} -> {}", from.display(), to.display())
            }
            ProgressEvent::Trash { path } => trace!("trash               {}", path.display()),
        }
    }
}

// 接收端已关闭时静默丢弃
impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn emit(&self, event: &ProgressEvent) {
        let _ = self.send(event.clone());
    }
}
