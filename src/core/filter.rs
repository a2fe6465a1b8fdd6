use regex::Regex;
use std::ffi::OsStr;
use tracing::warn;

/// Windows 资源管理器写入的目录标记文件，两侧都忽略
pub const DEFAULT_IGNORED_NAMES: &[&str] = &["desktop.ini"];

/// 忽略规则：命中的条目既不复制也不删除
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    /// 精确名称（小写比较）
    names: Vec<String>,
    /// 由通配符模式转换的正则
    patterns: Vec<Regex>,
}

impl IgnoreRules {
    /// 不忽略任何条目
    pub fn none() -> Self {
        Self {
            names: Vec::new(),
            patterns: Vec::new(),
        }
    }

    pub fn new<N, P>(names: N, patterns: P) -> Self
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();

        let patterns = patterns
            .into_iter()
            .filter_map(|p| {
                let p = p.as_ref();
                match glob_to_regex(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("忽略无效的模式 {}: {}", p, e);
                        None
                    }
                }
            })
            .collect();

        Self { names, patterns }
    }

    /// 检查名称是否应被忽略
    pub fn is_ignored(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy().to_lowercase();
        self.names.iter().any(|n| *n == name) || self.patterns.iter().any(|re| re.is_match(&name))
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_NAMES.iter(), std::iter::empty::<&str>())
    }
}

/// `*` 匹配任意字符，`?` 匹配单个字符，不区分大小写
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(&pattern.to_lowercase())
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_ignore_marker_file_case_insensitively() {
        let rules = IgnoreRules::default();
        assert!(rules.is_ignored(OsStr::new("desktop.ini")));
        assert!(rules.is_ignored(OsStr::new("Desktop.INI")));
        assert!(!rules.is_ignored(OsStr::new("desktop.ini.bak")));
    }

    #[test]
    fn glob_patterns_match_whole_name() {
        let rules = IgnoreRules::new(std::iter::empty::<&str>(), ["*.tmp", "~?lock"]);
        assert!(rules.is_ignored(OsStr::new("build.TMP")));
        assert!(rules.is_ignored(OsStr::new("~$lock")));
        assert!(!rules.is_ignored(OsStr::new("tmp.txt")));
        assert!(!rules.is_ignored(OsStr::new("~lock")));
    }

    #[test]
    fn dots_in_patterns_are_literal() {
        let rules = IgnoreRules::new(std::iter::empty::<&str>(), ["a.b"]);
        assert!(rules.is_ignored(OsStr::new("a.b")));
        assert!(!rules.is_ignored(OsStr::new("axb")));
    }

    #[test]
    fn none_ignores_nothing() {
        assert!(!IgnoreRules::none().is_ignored(OsStr::new("desktop.ini")));
    }
}
