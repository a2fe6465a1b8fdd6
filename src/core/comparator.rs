//! 整树比较 - 同步后检查目标树是否与参考树一致

use crate::core::filter::IgnoreRules;
use crate::error::{Result, SyncError};
use crate::storage::EntryKind;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 差异类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DifferenceKind {
    /// 参考树有，目标树没有
    MissingInTarget,
    /// 目标树多出的条目
    ExtraInTarget,
    /// 两侧都是文件但大小不同
    SizeMismatch { target: u64, reference: u64 },
    /// 一侧是文件，另一侧是目录
    KindMismatch,
}

/// 单条差异，路径相对于根目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeDifference {
    pub path: PathBuf,
    #[serde(flatten)]
    pub kind: DifferenceKind,
}

impl fmt::Display for TreeDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DifferenceKind::MissingInTarget => write!(f, "缺失  {}", self.path.display()),
            DifferenceKind::ExtraInTarget => write!(f, "多余  {}", self.path.display()),
            DifferenceKind::SizeMismatch { target, reference } => write!(
                f,
                "大小  {} (目标 {}, 参考 {})",
                self.path.display(),
                target,
                reference
            ),
            DifferenceKind::KindMismatch => write!(f, "类型  {}", self.path.display()),
        }
    }
}

/// 差异统计
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferenceSummary {
    pub missing_count: usize,
    pub extra_count: usize,
    pub size_mismatch_count: usize,
    pub kind_mismatch_count: usize,
}

impl DifferenceSummary {
    pub fn total(&self) -> usize {
        self.missing_count + self.extra_count + self.size_mismatch_count + self.kind_mismatch_count
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    kind: EntryKind,
    size: u64,
}

/// 递归列出目录树，返回 相对路径 -> 节点
///
/// 符号链接不跟随也不记录；根目录不可读时报错，更深层的读取错误只记日志。
fn scan_tree(root: &Path, rules: &IgnoreRules) -> Result<BTreeMap<PathBuf, Node>> {
    std::fs::read_dir(root).map_err(|e| SyncError::io("read_dir", root, e))?;

    let mut tree = BTreeMap::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !rules.is_ignored(e.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("扫描时跳过不可读条目: {}", e);
                continue;
            }
        };

        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            continue;
        };
        let size = match kind {
            EntryKind::File => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        };

        if let Ok(relative) = entry.path().strip_prefix(root) {
            tree.insert(relative.to_path_buf(), Node { kind, size });
        }
    }

    Ok(tree)
}

/// 比较两棵树，返回按相对路径排序的差异列表
///
/// 只比较名称、类型和文件大小。某个目录只在一侧存在时，
/// 其下的条目也会逐条列出。
pub fn compare_trees(
    target_root: &Path,
    reference_root: &Path,
    rules: &IgnoreRules,
) -> Result<Vec<TreeDifference>> {
    let target = scan_tree(target_root, rules)?;
    let reference = scan_tree(reference_root, rules)?;
    debug!(
        "比较目录树: 目标 {} 个条目, 参考 {} 个条目",
        target.len(),
        reference.len()
    );

    let all_paths: BTreeSet<_> = target.keys().chain(reference.keys()).collect();
    let mut differences = Vec::new();

    for path in all_paths {
        let kind = match (target.get(path), reference.get(path)) {
            (Some(_), None) => DifferenceKind::ExtraInTarget,
            (None, Some(_)) => DifferenceKind::MissingInTarget,
            (Some(t), Some(r)) if t.kind != r.kind => DifferenceKind::KindMismatch,
            (Some(t), Some(r)) if t.kind == EntryKind::File && t.size != r.size => {
                DifferenceKind::SizeMismatch {
                    target: t.size,
                    reference: r.size,
                }
            }
            _ => continue,
        };
        differences.push(TreeDifference {
            path: path.clone(),
            kind,
        });
    }

    Ok(differences)
}

/// 统计差异数量
pub fn summarize(differences: &[TreeDifference]) -> DifferenceSummary {
    let mut summary = DifferenceSummary::default();
    for diff in differences {
        match diff.kind {
            DifferenceKind::MissingInTarget => summary.missing_count += 1,
            DifferenceKind::ExtraInTarget => summary.extra_count += 1,
            DifferenceKind::SizeMismatch { .. } => summary.size_mismatch_count += 1,
            DifferenceKind::KindMismatch => summary.kind_mismatch_count += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_every_kind_of_difference() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t");
        let reference = dir.path().join("r");

        fs::create_dir_all(target.join("extra_dir")).unwrap();
        fs::create_dir_all(reference.join("missing_dir")).unwrap();
        fs::write(target.join("same.txt"), b"abc").unwrap();
        fs::write(reference.join("same.txt"), b"xyz").unwrap();
        fs::write(target.join("size.txt"), b"a").unwrap();
        fs::write(reference.join("size.txt"), b"ab").unwrap();
        fs::write(target.join("flip"), b"file").unwrap();
        fs::create_dir(reference.join("flip")).unwrap();

        let diffs = compare_trees(&target, &reference, &IgnoreRules::default()).unwrap();
        let summary = summarize(&diffs);

        assert_eq!(summary.extra_count, 1);
        assert_eq!(summary.missing_count, 1);
        assert_eq!(summary.size_mismatch_count, 1);
        assert_eq!(summary.kind_mismatch_count, 1);
        assert_eq!(summary.total(), diffs.len());
        // 大小相同即视为一致
        assert!(!diffs.iter().any(|d| d.path == Path::new("same.txt")));
        assert_eq!(
            diffs.iter().find(|d| d.path == Path::new("size.txt")).unwrap().kind,
            DifferenceKind::SizeMismatch {
                target: 1,
                reference: 2
            }
        );
    }

    #[test]
    fn ignored_names_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t");
        let reference = dir.path().join("r");
        fs::create_dir_all(&target).unwrap();
        fs::create_dir_all(&reference).unwrap();
        fs::write(target.join("desktop.ini"), b"x").unwrap();

        assert!(compare_trees(&target, &reference, &IgnoreRules::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unreadable_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = compare_trees(
            &dir.path().join("nope"),
            dir.path(),
            &IgnoreRules::default(),
        );
        assert!(result.is_err());
    }
}
