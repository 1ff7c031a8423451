use crate::{DfsError, DfsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized absolute namespace path, always starting with `/` and never
/// ending with one (except the root itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DfsPath(String);

impl DfsPath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse a client supplied path.
    /// `""`, `"/"` and `"\"` all denote the root; empty components are ignored,
    /// `.` and `..` are rejected.
    pub fn parse(path: &str) -> DfsResult<Self> {
        let mut parts = Vec::new();
        for part in path.split(|c: char| c == '/' || c == '\\') {
            match part {
                "" => continue,
                "." | ".." => {
                    return Err(DfsError::InvalidParam(format!(
                        "relative component '{}' in path {}",
                        part, path
                    )))
                }
                _ => parts.push(part),
            }
        }
        if parts.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(format!("/{}", parts.join("/"))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Return path components.
    /// Example: `/a/b` -> ["a", "b"], `/` -> []
    pub fn components(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Split path into parent and name components, `None` for the root.
    pub fn split_parent_name(&self) -> Option<(DfsPath, String)> {
        if self.is_root() {
            return None;
        }
        let last_slash = self.0.rfind('/')?;
        let parent = if last_slash == 0 {
            "/".to_string()
        } else {
            self.0[..last_slash].to_string()
        };
        let name = self.0[last_slash + 1..].to_string();
        Some((DfsPath(parent), name))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components().last().copied()
    }
}

impl fmt::Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_forms() {
        for raw in ["", "/", "\\", "///"] {
            let path = DfsPath::parse(raw).unwrap();
            assert!(path.is_root(), "{:?} should be root", raw);
            assert!(path.components().is_empty());
            assert!(path.split_parent_name().is_none());
        }
    }

    #[test]
    fn test_normalize_components() {
        let path = DfsPath::parse("//a///b/c.txt/").unwrap();
        assert_eq!(path.as_str(), "/a/b/c.txt");
        assert_eq!(path.components(), vec!["a", "b", "c.txt"]);
        assert_eq!(path.file_name(), Some("c.txt"));

        let relative = DfsPath::parse("a/b").unwrap();
        assert_eq!(relative.as_str(), "/a/b");
    }

    #[test]
    fn test_split_parent_name() {
        let (parent, name) = DfsPath::parse("/a").unwrap().split_parent_name().unwrap();
        assert!(parent.is_root());
        assert_eq!(name, "a");

        let (parent, name) = DfsPath::parse("/a/b/f.txt")
            .unwrap()
            .split_parent_name()
            .unwrap();
        assert_eq!(parent.as_str(), "/a/b");
        assert_eq!(name, "f.txt");
    }

    #[test]
    fn test_reject_dot_components() {
        assert!(matches!(
            DfsPath::parse("/a/../b"),
            Err(DfsError::InvalidParam(_))
        ));
        assert!(matches!(
            DfsPath::parse("/a/./b"),
            Err(DfsError::InvalidParam(_))
        ));
    }
}
