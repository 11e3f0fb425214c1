//! Architectural Enforcement Helpers
//!
//! Source-tree scanning used by the integration tests in `tests/`:
//! - Only the transport layer touches the WebSocket library
//! - Front-ends reach the backend through `SessionClient`, never a transport
//! - Library code propagates errors instead of panicking
//!
//! Scanning is line-based. Comment lines are skipped and everything after the
//! first `#[cfg(test)]` in a file is treated as test code.

use std::fs;
use std::path::{Path, PathBuf};

/// One production source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Line text, trimmed
    pub text: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.text)
    }
}

/// Workspace root (two levels above this crate)
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// All `.rs` files under `dir`, sorted
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Non-comment lines of `source` that precede its test module
pub fn production_lines_of(path: &Path, source: &str) -> Vec<SourceLine> {
    source
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(idx, line)| SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            text: line.trim().to_string(),
        })
        .collect()
}

/// Production lines of every Rust file under `dir` matching `predicate`
pub fn find_lines<F>(dir: &Path, predicate: F) -> Vec<SourceLine>
where
    F: Fn(&str) -> bool,
{
    rust_files(dir)
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok().map(|src| (path, src)))
        .flat_map(|(path, src)| production_lines_of(path, &src))
        .filter(|line| predicate(code_part(&line.text)))
        .collect()
}

/// Line text with any trailing `//` comment removed
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let src = "use a;\n// note\nfn f() {}\n#[cfg(test)]\nmod tests { fn g() { x.unwrap(); } }\n";
        let lines = production_lines_of(Path::new("x.rs"), src);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["use a;", "fn f() {}"]);
        assert_eq!(lines[1].number, 3);
    }

    #[test]
    fn test_code_part_drops_trailing_comment() {
        assert_eq!(code_part("let x = 1; // .unwrap()"), "let x = 1; ");
    }
}
