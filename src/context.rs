use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Default per-file size limit. Larger files are skipped with a warning.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 512 * 1024;

/// Default cap on the rendered context block.
/// 2 MB ≈ 500K–700K tokens, within frontier model context windows.
pub const DEFAULT_MAX_CONTEXT_BYTES: usize = 2 * 1024 * 1024;

/// How many leading bytes are inspected for NUL when sniffing binaries.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Size limits applied while collecting and rendering context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_file_bytes: u64,
    pub max_context_bytes: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_context_bytes: DEFAULT_MAX_CONTEXT_BYTES,
        }
    }
}

/// One text file included in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

/// Non-fatal problem encountered while collecting context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextWarning {
    Binary { path: String },
    Oversized { path: String, size: u64, limit: u64 },
    Unreadable { path: String, reason: String },
    InvalidPattern { pattern: String, reason: String },
}

impl ContextWarning {
    pub fn path(&self) -> &str {
        match self {
            Self::Binary { path }
            | Self::Oversized { path, .. }
            | Self::Unreadable { path, .. } => path,
            Self::InvalidPattern { pattern, .. } => pattern,
        }
    }
}

impl fmt::Display for ContextWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary { path } => write!(f, "skipping binary file {path}"),
            Self::Oversized { path, size, limit } => {
                write!(f, "skipping {path}: {size} bytes exceeds limit of {limit}")
            }
            Self::Unreadable { path, reason } => write!(f, "skipping {path}: {reason}"),
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "ignoring invalid pattern {pattern:?}: {reason}")
            }
        }
    }
}

/// Ordered, deduplicated set of context files plus the warnings raised
/// while gathering them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock {
    files: Vec<ContextFile>,
    warnings: Vec<ContextWarning>,
    max_context_bytes: usize,
}

impl ContextBlock {
    pub fn files(&self) -> &[ContextFile] {
        &self.files
    }

    pub fn warnings(&self) -> &[ContextWarning] {
        &self.warnings
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Concatenate all files into `<file path="...">` sections, capped at the
    /// configured maximum with a trailing truncation marker.
    pub fn render(&self) -> String {
        let mut output = String::new();
        for file in &self.files {
            output.push_str(&format!(
                "<file path=\"{}\">\n{}\n</file>\n",
                escape_xml_attr(&file.path),
                escape_xml_content(&file.content)
            ));
        }
        truncate_rendered(output, self.max_context_bytes)
    }
}

/// Expands context patterns into a [`ContextBlock`].
#[derive(Debug, Clone, Default)]
pub struct ContextCollector {
    limits: ContextLimits,
}

impl ContextCollector {
    pub fn new(limits: ContextLimits) -> Self {
        Self { limits }
    }

    /// Resolve every pattern in order. Problems with individual files are
    /// recorded as warnings; collection itself never fails.
    pub fn collect<S: AsRef<str>>(&self, patterns: &[S]) -> ContextBlock {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::new();
        let mut warnings = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let candidates = expand_pattern(pattern, &mut warnings);
            if candidates.is_empty() {
                tracing::debug!(pattern, "context pattern matched no files");
            }

            for path in candidates {
                // Symlinks and `./` prefixes resolve to the same canonical key.
                let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
                if !seen.insert(key) {
                    continue;
                }
                match self.read_text_file(&path) {
                    Ok(file) => files.push(file),
                    Err(warning) => warnings.push(warning),
                }
            }
        }

        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        tracing::debug!(
            files = files.len(),
            warnings = warnings.len(),
            "context collected"
        );

        ContextBlock {
            files,
            warnings,
            max_context_bytes: self.limits.max_context_bytes,
        }
    }

    fn read_text_file(&self, path: &Path) -> Result<ContextFile, ContextWarning> {
        let unreadable = |e: std::io::Error| ContextWarning::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let display = path.display().to_string();

        // Check size via metadata before reading to avoid loading huge files.
        let size = std::fs::metadata(path).map_err(unreadable)?.len();
        if size > self.limits.max_file_bytes {
            return Err(ContextWarning::Oversized {
                path: display,
                size,
                limit: self.limits.max_file_bytes,
            });
        }

        let mut bytes = Vec::with_capacity(size as usize);
        std::fs::File::open(path)
            .and_then(|f| f.take(self.limits.max_file_bytes + 1).read_to_end(&mut bytes))
            .map_err(unreadable)?;

        if looks_binary(&bytes) {
            return Err(ContextWarning::Binary { path: display });
        }
        let content =
            String::from_utf8(bytes).map_err(|_| ContextWarning::Binary { path: display.clone() })?;

        Ok(ContextFile {
            path: display,
            content,
        })
    }
}

/// Expand one pattern into candidate file paths in lexical order.
fn expand_pattern(pattern: &str, warnings: &mut Vec<ContextWarning>) -> Vec<PathBuf> {
    let path = Path::new(pattern);

    if path.is_dir() {
        return match list_directory(path) {
            Ok(files) => files,
            Err(e) => {
                warnings.push(ContextWarning::Unreadable {
                    path: pattern.to_string(),
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };
    }

    // A literal file wins over glob syntax, so `pages/[id].tsx` is itself.
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    if is_glob(pattern) {
        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warnings.push(ContextWarning::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                });
                return Vec::new();
            }
        };
        let mut matched = Vec::new();
        for entry in entries {
            match entry {
                Ok(p) if p.is_file() => matched.push(p),
                Ok(_) => {}
                Err(e) => warnings.push(ContextWarning::Unreadable {
                    path: e.path().display().to_string(),
                    reason: e.error().to_string(),
                }),
            }
        }
        matched.sort();
        return matched;
    }

    let reason = if path.exists() {
        "not a regular file".to_string()
    } else {
        "no such file or directory".to_string()
    };
    warnings.push(ContextWarning::Unreadable {
        path: pattern.to_string(),
        reason,
    });
    Vec::new()
}

/// Regular files directly under `dir`, sorted. Does not recurse.
fn list_directory(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// NUL bytes in the leading window mark a file as binary.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_BYTES)].contains(&0)
}

/// Escape XML content characters: `<`, `>`, `&`.
pub fn escape_xml_content(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape XML attribute values: `"`, `<`, `>`, `&`.
pub fn escape_xml_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Cap rendered context at `budget` bytes. The cut lands on a line boundary
/// when one exists, never inside a UTF-8 char or an XML entity, and is
/// followed by a marker stating how much was dropped.
pub fn truncate_rendered(rendered: String, budget: usize) -> String {
    if rendered.len() <= budget {
        return rendered;
    }

    let safe_end = floor_char_boundary(&rendered, budget);
    let safe_end = floor_entity_boundary(&rendered, safe_end);
    let cut = match rendered[..safe_end].rfind('\n') {
        Some(pos) => pos + 1,
        None => safe_end,
    };

    let omitted = rendered.len() - cut;
    let mut out = rendered;
    out.truncate(cut);
    out.push_str(&format!("<!-- context truncated: {omitted} bytes omitted -->\n"));
    out
}

/// Find the largest byte index ≤ `index` that doesn't split an XML entity.
fn floor_entity_boundary(s: &str, index: usize) -> usize {
    if index == 0 || index >= s.len() {
        return index;
    }
    // Longest entity is "&quot;" (6 bytes), so look back at most 5.
    let start = floor_char_boundary(s, index.saturating_sub(5));
    if let Some(amp_offset) = s[start..index].rfind('&') {
        let amp_pos = start + amp_offset;
        // Byte search: the window end may fall inside a multibyte char.
        let window_end = s.len().min(amp_pos + 6);
        if let Some(semi) = s.as_bytes()[amp_pos..window_end]
            .iter()
            .position(|&b| b == b';')
            && amp_pos + semi >= index
        {
            return amp_pos;
        }
    }
    index
}

/// Find the largest byte index ≤ `index` that is a valid UTF-8 char boundary.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_marks_omitted_bytes() {
        let rendered = "line one\nline two\nline three\n".to_string();
        let out = truncate_rendered(rendered, 12);
        assert!(out.starts_with("line one\n"));
        assert!(!out.contains("line two"));
        assert!(out.ends_with("<!-- context truncated: 20 bytes omitted -->\n"));
    }

    #[test]
    fn truncation_is_noop_within_budget() {
        let rendered = "short\n".to_string();
        assert_eq!(truncate_rendered(rendered.clone(), 100), rendered);
    }

    #[test]
    fn truncation_never_splits_multibyte_chars() {
        let rendered = "ééééé".to_string();
        let out = truncate_rendered(rendered, 3);
        assert!(out.starts_with('é'));
        assert!(out.contains("context truncated"));
    }

    #[test]
    fn entity_boundary_backs_off_partial_entity() {
        let s = "ab&lt;cd";
        assert_eq!(floor_entity_boundary(s, 4), 2);
        assert_eq!(floor_entity_boundary(s, 6), 6);
    }

    #[test]
    fn entity_followed_by_multibyte_char_does_not_panic() {
        // "&amp;" is bytes 1..6 and 'é' is bytes 6..8, so a 6-byte window
        // from the '&' ends inside 'é'.
        let s = "R&amp;é\n";
        assert_eq!(floor_entity_boundary(s, 4), 1);

        let out = truncate_rendered(s.to_string(), 4);
        assert!(out.starts_with("R<!-- context truncated: "), "{out}");

        let s = "&lt;€";
        assert_eq!(floor_entity_boundary(s, 2), 0);
        assert_eq!(floor_entity_boundary(s, 4), 4);
    }

    #[test]
    fn glob_detection() {
        assert!(is_glob("src/*.rs"));
        assert!(is_glob("src/**/mod.rs"));
        assert!(is_glob("file?.txt"));
        assert!(!is_glob("src/main.rs"));
    }

    #[test]
    fn nul_byte_means_binary() {
        assert!(looks_binary(b"\x7fELF\0\0\x01"));
        assert!(!looks_binary(b"fn main() {}\n"));
    }

    #[test]
    fn warning_display_names_the_path() {
        let w = ContextWarning::Oversized {
            path: "big.log".into(),
            size: 10,
            limit: 5,
        };
        assert_eq!(w.path(), "big.log");
        assert!(w.to_string().contains("exceeds limit"));
    }
}
