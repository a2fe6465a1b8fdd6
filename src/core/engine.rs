use crate::core::entity::{normalize_path, Directory, FileEntry};
use crate::core::filter::IgnoreRules;
use crate::core::progress::{ProgressEvent, ProgressSink};
use crate::core::report::{ItemAction, ItemOutcome, SyncReport};
use crate::error::{Result, SyncError};
use crate::storage::{EntryKind, FreedesktopTrash, LocalStorage, Storage, Trash, TrashOutcome};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 两侧都忽略的条目
    pub ignore: IgnoreRules,
    /// 目标根目录不存在时是否自动创建
    pub auto_create_target: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ignore: IgnoreRules::default(),
            auto_create_target: true,
        }
    }
}

/// 镜像引擎
///
/// 单线程、深度优先地把目标树对齐到参考树。只比较名称和字节数；
/// 所有删除都经过回收站。
pub struct MirrorEngine {
    storage: Arc<dyn Storage>,
    trash: Arc<dyn Trash>,
    progress: Option<Arc<dyn ProgressSink>>,
    config: SyncConfig,
}

impl MirrorEngine {
    pub fn new(storage: Arc<dyn Storage>, trash: Arc<dyn Trash>) -> Self {
        Self {
            storage,
            trash,
            progress: None,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(storage: Arc<dyn Storage>, trash: Arc<dyn Trash>, config: SyncConfig) -> Self {
        Self {
            storage,
            trash,
            progress: None,
            config,
        }
    }

    /// 接入进度接收端
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.progress {
            sink.emit(&event);
        }
    }

    fn snapshot(&self, path: &Path) -> Directory {
        Directory::snapshot(self.storage.as_ref(), path, &self.config.ignore)
    }

    /// 入口：以字符串形式给出两个根目录
    pub fn synchronize(&self, target_root: &str, reference_root: &str) -> Result<SyncReport> {
        let target = normalize_path(target_root)?;
        let reference = normalize_path(reference_root)?;
        self.synchronize_paths(&target, &reference)
    }

    /// 把 `target_root` 对齐为 `reference_root` 的镜像
    pub fn synchronize_paths(&self, target_root: &Path, reference_root: &Path) -> Result<SyncReport> {
        self.preflight(target_root, reference_root)?;

        info!(
            "开始同步: {} <- {} (存储: {}, 回收站: {})",
            target_root.display(),
            reference_root.display(),
            self.storage.name(),
            self.trash.location().display()
        );

        let mut report = SyncReport::new(target_root, reference_root);
        self.traverse_folders(target_root, reference_root, &mut report);
        report.finish();

        info!(
            "同步完成: 复制 {}, 重新复制 {}, 删除 {}, 移动 {}, 失败 {}",
            report.files_copied,
            report.files_recopied,
            report.files_trashed,
            report.files_relocated,
            report.failed.len()
        );

        Ok(report)
    }

    /// 检查根目录：参考目录必须存在，两个根目录及回收站互不包含
    fn preflight(&self, target_root: &Path, reference_root: &Path) -> Result<()> {
        // 根目录允许是符号链接，先解析再检查类型
        let reference = self
            .storage
            .canonicalize(reference_root)
            .map_err(|_| SyncError::ReferenceMissing(reference_root.to_path_buf()))?;
        if !self.is_dir(&reference)? {
            return Err(SyncError::ReferenceMissing(reference_root.to_path_buf()));
        }
        // 参考目录列不出来时快照为空，会把整个目标树移入回收站
        if let Err(e) = self.storage.list_dir(&reference) {
            warn!("参考目录不可读: {} - {}", reference_root.display(), e);
            return Err(SyncError::ReferenceMissing(reference_root.to_path_buf()));
        }

        let target = match self.storage.canonicalize(target_root) {
            Ok(path) => path,
            Err(e) if e.is_not_found() && self.config.auto_create_target => {
                debug!("目标目录不存在，自动创建: {}", target_root.display());
                self.storage.create_dir_all(target_root)?;
                self.storage.canonicalize(target_root)?
            }
            Err(e) if e.is_not_found() => {
                return Err(SyncError::TargetMissing(target_root.to_path_buf()))
            }
            Err(e) => return Err(e),
        };
        if !self.is_dir(&target)? {
            return Err(SyncError::InvalidPath(format!(
                "目标路径不是目录: {}",
                target_root.display()
            )));
        }

        if target.starts_with(&reference) || reference.starts_with(&target) {
            return Err(SyncError::OverlappingRoots { target, reference });
        }

        let trash = self
            .storage
            .canonicalize(self.trash.location())
            .unwrap_or_else(|_| self.trash.location().to_path_buf());
        let inside = |root: &Path| trash.starts_with(root);
        if inside(target.as_path())
            || inside(reference.as_path())
            || inside(target_root)
            || inside(reference_root)
        {
            return Err(SyncError::InvalidPath(format!(
                "回收站不能位于同步目录内: {}",
                trash.display()
            )));
        }

        Ok(())
    }

    fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(matches!(self.storage.stat(path)?, Some(meta) if meta.kind == EntryKind::Dir))
    }

    /// 并行遍历两棵树
    ///
    /// 两侧都有的子目录递归进入；参考侧独有的子目录新建后整体复制；
    /// 子目录处理完后重新列出目标目录，再对齐本层文件。
    pub fn traverse_folders(&self, target_path: &Path, reference_path: &Path, report: &mut SyncReport) {
        self.emit(ProgressEvent::EnterPair {
            target: target_path.to_path_buf(),
            reference: reference_path.to_path_buf(),
        });

        let target = self.snapshot(target_path);
        let reference = self.snapshot(reference_path);

        if reference.has_subdirs() {
            for name in reference.subdir_names() {
                let target_sub = target.subdir(name);
                let reference_sub = reference.subdir(name);

                if target.has_subdir(name) {
                    self.traverse_folders(&target_sub, &reference_sub, report);
                } else if self.create_dir(&target_sub, report).is_ok() {
                    self.copy_entire_folder(&target_sub, &reference_sub, report);
                }
            }
        }

        let target = self.snapshot(target_path);
        self.copy_files(&target, &reference, report);
    }

    /// 目标侧没有对应目录时，整体复制参考子树
    ///
    /// `target_path` 必须已经存在。先逐层创建子目录并递归，最后对齐本层文件。
    /// 某个子目录创建失败只放弃该分支，兄弟目录继续。
    pub fn copy_entire_folder(&self, target_path: &Path, reference_path: &Path, report: &mut SyncReport) {
        self.emit(ProgressEvent::CopyFolder {
            target: target_path.to_path_buf(),
            reference: reference_path.to_path_buf(),
        });

        // 参考树不会被修改，整个过程沿用同一快照
        let reference = self.snapshot(reference_path);

        for name in reference.subdir_names() {
            let new_dir = target_path.join(name);
            if self.create_dir(&new_dir, report).is_err() {
                continue;
            }
            self.copy_entire_folder(&new_dir, &reference.subdir(name), report);
        }

        let target = self.snapshot(target_path);
        self.copy_files(&target, &reference, report);
    }

    /// 对齐同一位置的一层目录
    ///
    /// 1. 目标独有的子目录：清空到 `target` 后移除
    /// 2. 目标独有的文件：移入回收站
    /// 3. 参考中的文件：目标缺失则复制，大小不同则替换，大小相同保持不动
    ///
    /// 第 2、3 步使用传入的 `target` 快照，即第 1 步移入的孤立文件不参与本次比较。
    /// 不递归进入两侧都有的子目录。
    pub fn copy_files(&self, target: &Directory, reference: &Directory, report: &mut SyncReport) {
        self.emit(ProgressEvent::ReconcileFiles {
            target: target.path().to_path_buf(),
            reference: reference.path().to_path_buf(),
        });

        for name in target.subdir_names() {
            if !reference.has_subdir(name) {
                let orphan = self.snapshot(&target.subdir(name));
                self.empty_subdirs(&orphan, target, report);
            }
        }

        for file in target.files() {
            let Some(name) = file.name() else { continue };
            if reference.has_file(name) {
                continue;
            }
            match self.trash_file(&file) {
                Ok(TrashOutcome::Trashed { .. }) => {
                    report.record(ItemAction::TrashFile, file.path(), ItemOutcome::Success)
                }
                Ok(TrashOutcome::Missing) => {
                    report.record(ItemAction::TrashFile, file.path(), ItemOutcome::skipped("已不存在"))
                }
                Err(e) => self.record_failure(ItemAction::TrashFile, file.path(), &e, report),
            }
        }

        for reference_file in reference.files() {
            let Some(name) = reference_file.name() else { continue };
            let dest = target.path().join(name);

            match target.file(name) {
                Some(existing) if existing.size() == reference_file.size() => {
                    report.record(ItemAction::KeepFile, &dest, ItemOutcome::Success);
                }
                Some(existing) => {
                    debug!(
                        "大小不同，重新复制: {} ({} -> {})",
                        dest.display(),
                        existing.size(),
                        reference_file.size()
                    );
                    // 旧文件无法移入回收站时不覆盖它
                    if let Err(e) = self.trash_file(&existing) {
                        self.record_failure(ItemAction::RecopyFile, &dest, &e, report);
                        continue;
                    }
                    self.copy_one(reference_file.path(), &dest, ItemAction::RecopyFile, report);
                }
                None => {
                    // 快照之后出现的同名文件（如刚移入的孤立文件）先移入回收站
                    let appeared = match FileEntry::stat(self.storage.as_ref(), &dest) {
                        Ok(appeared) => appeared,
                        Err(e) => {
                            self.record_failure(ItemAction::CopyFile, &dest, &e, report);
                            continue;
                        }
                    };
                    if let Some(appeared) = appeared {
                        debug!("目标出现快照外的同名文件: {}", dest.display());
                        if let Err(e) = self.trash_file(&appeared) {
                            self.record_failure(ItemAction::CopyFile, &dest, &e, report);
                            continue;
                        }
                    }
                    self.copy_one(reference_file.path(), &dest, ItemAction::CopyFile, report);
                }
            }
        }
    }

    /// 递归清空孤立子树：文件移动到 `destination`，最后移除子树本身
    ///
    /// 先处理子目录（每个子目录重新列出），再移动本层文件。目的地已有同名文件时，
    /// 被移动的文件移入回收站而不是覆盖；文件中途消失则跳过。
    pub fn empty_subdirs(&self, subtree: &Directory, destination: &Directory, report: &mut SyncReport) {
        self.emit(ProgressEvent::Drain {
            subtree: subtree.path().to_path_buf(),
            destination: destination.path().to_path_buf(),
        });

        for path in subtree.subdir_paths() {
            let child = self.snapshot(&path);
            self.empty_subdirs(&child, destination, report);
        }

        for file in subtree.files() {
            let Some(name) = file.name() else { continue };
            let dest = destination.path().join(name);

            if self.storage.exists(&dest) {
                debug!("目的地已有同名文件，丢弃: {}", file.path().display());
                match self.trash_file(&file) {
                    Ok(TrashOutcome::Trashed { .. }) => {
                        report.record(ItemAction::DiscardFile, file.path(), ItemOutcome::Success)
                    }
                    Ok(TrashOutcome::Missing) => report.record(
                        ItemAction::DiscardFile,
                        file.path(),
                        ItemOutcome::skipped("已不存在"),
                    ),
                    Err(e) => self.record_failure(ItemAction::DiscardFile, file.path(), &e, report),
                }
                continue;
            }

            self.emit(ProgressEvent::Relocate {
                from: file.path().to_path_buf(),
                to: dest.clone(),
            });
            match self.storage.rename(file.path(), &dest) {
                Ok(()) => report.record(ItemAction::RelocateFile, &dest, ItemOutcome::Success),
                Err(e) if e.is_not_found() => report.record(
                    ItemAction::RelocateFile,
                    file.path(),
                    ItemOutcome::skipped("已不存在"),
                ),
                Err(e) => self.record_failure(ItemAction::RelocateFile, file.path(), &e, report),
            }
        }

        self.emit(ProgressEvent::Trash {
            path: subtree.path().to_path_buf(),
        });
        match subtree.delete(self.trash.as_ref()) {
            Ok(TrashOutcome::Trashed { .. }) => {
                report.record(ItemAction::RemoveDir, subtree.path(), ItemOutcome::Success)
            }
            Ok(TrashOutcome::Missing) => {
                report.record(ItemAction::RemoveDir, subtree.path(), ItemOutcome::skipped("已不存在"))
            }
            Err(e) => self.record_failure(ItemAction::RemoveDir, subtree.path(), &e, report),
        }
    }

    /// 创建目标子目录
    ///
    /// 同名普通文件挡路时先移入回收站再创建；其他失败记入报告并返回错误，
    /// 调用方放弃该分支。
    fn create_dir(&self, path: &Path, report: &mut SyncReport) -> Result<()> {
        let result = match self.storage.create_dir(path) {
            Err(e) if e.io_kind() == Some(io::ErrorKind::AlreadyExists) => {
                self.replace_blocking_file(path, e)
            }
            other => other,
        };

        match result {
            Ok(()) => {
                report.record(ItemAction::CreateDir, path, ItemOutcome::Success);
                Ok(())
            }
            Err(e) => {
                self.record_failure(ItemAction::CreateDir, path, &e, report);
                Err(e)
            }
        }
    }

    fn replace_blocking_file(&self, path: &Path, original: SyncError) -> Result<()> {
        match FileEntry::stat(self.storage.as_ref(), path)? {
            Some(file) => {
                debug!("同名文件挡住了目录，移入回收站: {}", path.display());
                self.trash_file(&file)?;
                self.storage.create_dir(path)
            }
            None => Err(original),
        }
    }

    fn copy_one(&self, from: &Path, to: &Path, action: ItemAction, report: &mut SyncReport) {
        self.emit(ProgressEvent::CopyFile {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });

        match self.storage.copy_file(from, to) {
            Ok(bytes) => {
                report.add_bytes(bytes);
                report.record(action, to, ItemOutcome::Success);
            }
            Err(e) if e.is_not_found() => {
                debug!("源文件已消失，跳过: {}", from.display());
                report.record(action, from, ItemOutcome::skipped(&e));
            }
            Err(e) => self.record_failure(action, to, &e, report),
        }
    }

    fn trash_file(&self, file: &FileEntry) -> Result<TrashOutcome> {
        self.emit(ProgressEvent::Trash {
            path: file.path().to_path_buf(),
        });
        file.delete(self.trash.as_ref())
    }

    fn record_failure(&self, action: ItemAction, path: &Path, err: &SyncError, report: &mut SyncReport) {
        warn!("[{}] {} 失败: {}", action, path.display(), error_chain(err));
        report.record(action, path, ItemOutcome::failed(error_chain(err)));
    }
}

/// 错误及其来源拼成一行
fn error_chain(err: &SyncError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// 使用本地存储和默认回收站执行一次同步
pub fn synchronize(target_root: &str, reference_root: &str) -> Result<SyncReport> {
    MirrorEngine::new(
        Arc::new(LocalStorage::new()),
        Arc::new(FreedesktopTrash::at_default_location()),
    )
    .synchronize(target_root, reference_root)
}

/// 同上，路径版本
pub fn synchronize_paths(target_root: impl Into<PathBuf>, reference_root: impl Into<PathBuf>) -> Result<SyncReport> {
    MirrorEngine::new(
        Arc::new(LocalStorage::new()),
        Arc::new(FreedesktopTrash::at_default_location()),
    )
    .synchronize_paths(&target_root.into(), &reference_root.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        target: PathBuf,
        reference: PathBuf,
        engine: MirrorEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let reference = dir.path().join("reference");
        fs::create_dir(&target).unwrap();
        fs::create_dir(&reference).unwrap();
        let engine = MirrorEngine::new(
            Arc::new(LocalStorage::new()),
            Arc::new(FreedesktopTrash::new(dir.path().join("Trash"))),
        );
        Fixture {
            _dir: dir,
            target,
            reference,
            engine,
        }
    }

    fn write(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    #[test]
    fn copy_files_does_not_recurse_into_shared_subdirs() {
        let fx = fixture();
        write(&fx.reference.join("shared").join("deep.txt"), 4);
        fs::create_dir(fx.target.join("shared")).unwrap();
        write(&fx.reference.join("top.txt"), 2);

        let target = fx.engine.snapshot(&fx.target);
        let reference = fx.engine.snapshot(&fx.reference);
        let mut report = SyncReport::new(&fx.target, &fx.reference);
        fx.engine.copy_files(&target, &reference, &mut report);

        assert!(fx.target.join("top.txt").exists());
        assert!(fx.target.join("shared").is_dir());
        assert!(!fx.target.join("shared").join("deep.txt").exists());
        assert_eq!(report.files_copied, 1);
    }

    #[test]
    fn copy_files_uses_snapshot_taken_before_draining() {
        let fx = fixture();
        write(&fx.target.join("orphan").join("stray.txt"), 1);

        let target = fx.engine.snapshot(&fx.target);
        let reference = fx.engine.snapshot(&fx.reference);
        let mut report = SyncReport::new(&fx.target, &fx.reference);
        fx.engine.copy_files(&target, &reference, &mut report);

        // 移入的孤立文件不在快照中，本次不会被删除
        assert!(fx.target.join("stray.txt").exists());
        assert!(!fx.target.join("orphan").exists());
        assert_eq!(report.files_relocated, 1);
        assert_eq!(report.dirs_removed, 1);
        assert_eq!(report.files_trashed, 0);
    }

    #[test]
    fn empty_subdirs_drains_depth_first_and_discards_collisions() {
        let fx = fixture();
        write(&fx.target.join("keep.txt"), 9);
        write(&fx.target.join("o").join("a.txt"), 1);
        write(&fx.target.join("o").join("inner").join("b.txt"), 2);
        write(&fx.target.join("o").join("inner").join("keep.txt"), 3);

        let destination = fx.engine.snapshot(&fx.target);
        let subtree = fx.engine.snapshot(&fx.target.join("o"));
        let mut report = SyncReport::new(&fx.target, &fx.reference);
        fx.engine.empty_subdirs(&subtree, &destination, &mut report);

        assert!(!fx.target.join("o").exists());
        assert_eq!(fs::metadata(fx.target.join("a.txt")).unwrap().len(), 1);
        assert_eq!(fs::metadata(fx.target.join("b.txt")).unwrap().len(), 2);
        // 同名文件保留目的地原有内容
        assert_eq!(fs::metadata(fx.target.join("keep.txt")).unwrap().len(), 9);
        assert_eq!(report.files_relocated, 2);
        assert_eq!(report.files_discarded, 1);
        assert_eq!(report.dirs_removed, 2);
    }

    #[test]
    fn copy_entire_folder_materializes_nested_tree() {
        let fx = fixture();
        write(&fx.reference.join("x").join("y").join("z.bin"), 7);
        write(&fx.reference.join("x").join("top.bin"), 3);
        fs::create_dir(fx.target.join("x")).unwrap();

        let mut report = SyncReport::new(&fx.target, &fx.reference);
        fx.engine
            .copy_entire_folder(&fx.target.join("x"), &fx.reference.join("x"), &mut report);

        assert_eq!(fs::metadata(fx.target.join("x/y/z.bin")).unwrap().len(), 7);
        assert_eq!(fs::metadata(fx.target.join("x/top.bin")).unwrap().len(), 3);
        assert_eq!(report.dirs_created, 1);
        assert_eq!(report.files_copied, 2);
    }

    #[test]
    fn blocking_file_is_replaced_by_directory() {
        let fx = fixture();
        write(&fx.reference.join("sub").join("f.txt"), 1);
        write(&fx.target.join("sub"), 5);

        let report = fx.engine.synchronize_paths(&fx.target, &fx.reference).unwrap();

        assert!(fx.target.join("sub").is_dir());
        assert!(fx.target.join("sub").join("f.txt").exists());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn directory_replaced_by_file_of_same_name() {
        let fx = fixture();
        write(&fx.reference.join("name"), 4);
        write(&fx.target.join("name").join("inside.txt"), 2);

        fx.engine.synchronize_paths(&fx.target, &fx.reference).unwrap();

        assert!(fx.target.join("name").is_file());
        assert_eq!(fs::metadata(fx.target.join("name")).unwrap().len(), 4);
        assert!(fx.target.join("inside.txt").exists());
    }

    #[test]
    fn ignored_names_are_left_alone_on_both_sides() {
        let fx = fixture();
        write(&fx.reference.join("desktop.ini"), 10);
        write(&fx.target.join("Desktop.ini"), 3);

        let report = fx.engine.synchronize_paths(&fx.target, &fx.reference).unwrap();

        assert_eq!(fs::metadata(fx.target.join("Desktop.ini")).unwrap().len(), 3);
        assert_eq!(report.changes(), 0);
    }

    #[test]
    fn preflight_rejects_missing_reference_and_nested_roots() {
        let fx = fixture();
        let missing = fx.reference.join("nope");
        assert!(matches!(
            fx.engine.synchronize_paths(&fx.target, &missing),
            Err(SyncError::ReferenceMissing(_))
        ));

        let nested = fx.reference.join("inner");
        fs::create_dir(&nested).unwrap();
        assert!(matches!(
            fx.engine.synchronize_paths(&nested, &fx.reference),
            Err(SyncError::OverlappingRoots { .. })
        ));
    }

    #[test]
    fn missing_target_is_created_or_rejected_by_config() {
        let fx = fixture();
        let fresh = fx.target.join("fresh");
        write(&fx.reference.join("a"), 1);

        fx.engine.synchronize_paths(&fresh, &fx.reference).unwrap();
        assert!(fresh.join("a").exists());

        let strict = MirrorEngine::with_config(
            Arc::new(LocalStorage::new()),
            Arc::new(FreedesktopTrash::new(fx.target.parent().unwrap().join("Trash2"))),
            SyncConfig {
                auto_create_target: false,
                ..SyncConfig::default()
            },
        );
        assert!(matches!(
            strict.synchronize_paths(&fx.target.join("other"), &fx.reference),
            Err(SyncError::TargetMissing(_))
        ));
    }

    #[test]
    fn trash_inside_target_is_rejected() {
        let fx = fixture();
        let engine = MirrorEngine::new(
            Arc::new(LocalStorage::new()),
            Arc::new(FreedesktopTrash::new(fx.target.join(".Trash"))),
        );
        assert!(matches!(
            engine.synchronize_paths(&fx.target, &fx.reference),
            Err(SyncError::InvalidPath(_))
        ));
    }

    #[test]
    fn progress_events_follow_traversal() {
        let fx = fixture();
        write(&fx.reference.join("s").join("f"), 1);
        let (tx, rx) = std::sync::mpsc::channel();
        let engine = MirrorEngine::new(
            Arc::new(LocalStorage::new()),
            Arc::new(FreedesktopTrash::new(fx.target.parent().unwrap().join("Trash"))),
        )
        .with_progress(Arc::new(tx));

        engine.synchronize_paths(&fx.target, &fx.reference).unwrap();
        drop(engine);

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events.first(), Some(ProgressEvent::EnterPair { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::CopyFolder { target, .. } if target.file_name() == Some(OsStr::new("s")))));
        assert!(matches!(events.last(), Some(ProgressEvent::ReconcileFiles { .. })));
    }
}
