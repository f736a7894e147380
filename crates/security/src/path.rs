//! Path validation — filesystem sandboxing to the workspace.
//!
//! Ensures file tools can only touch paths inside the allowed roots.
//! Containment is checked component-wise on resolved paths, so a sibling
//! such as `/work-evil` never counts as inside `/work`.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use ferrocode_core::error::ToolError;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Symlinks followed by hand before a path is refused as a loop.
const MAX_LINK_HOPS: u32 = 40;

/// Error returned when a sandboxed operation fails.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Path '{path}' is outside the allowed roots")]
    OutsideRoots { path: String },

    #[error("At least one allowed root is required")]
    NoRoots,

    #[error("Invalid sandbox root '{path}': {reason}")]
    InvalidRoot { path: String, reason: String },

    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },
}

impl SandboxError {
    fn io(path: &Path, err: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::OutsideRoots { .. } => ToolError::SandboxViolation(err.to_string()),
            other => ToolError::ExecutionFailed {
                tool_name: "filesystem".into(),
                reason: other.to_string(),
            },
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

/// Sandboxed file operations confined to a set of allowed roots.
///
/// Roots are canonicalized once at construction and never change, so a
/// single instance can be shared across concurrent runs behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SafeFileOps {
    roots: Vec<PathBuf>,
}

impl SafeFileOps {
    /// Build a sandbox. The first root is the primary one: relative paths
    /// are resolved against it.
    pub fn new<I, P>(roots: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut canonical = Vec::new();
        for root in roots {
            let root = root.as_ref();
            let resolved = root.canonicalize().map_err(|e| SandboxError::InvalidRoot {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;
            if !resolved.is_dir() {
                return Err(SandboxError::InvalidRoot {
                    path: root.display().to_string(),
                    reason: "not a directory".into(),
                });
            }
            if !canonical.contains(&resolved) {
                canonical.push(resolved);
            }
        }
        if canonical.is_empty() {
            return Err(SandboxError::NoRoots);
        }
        debug!(roots = ?canonical, "Sandbox initialised");
        Ok(Self { roots: canonical })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The root relative paths resolve against.
    pub fn primary_root(&self) -> &Path {
        &self.roots[0]
    }

    /// Resolve `path` and require it to lie inside an allowed root.
    ///
    /// Steps: make absolute, lexically clean, resolve symlinks on the longest
    /// existing ancestor, then check containment. Returns the resolved path.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let raw = path.as_ref();
        let absolute = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.primary_root().join(raw)
        };
        let cleaned = lexical_clean(&absolute);
        let Some(resolved) = resolve_existing_prefix(&cleaned, MAX_LINK_HOPS) else {
            warn!(path = %raw.display(), "Sandbox violation: symlink loop");
            return Err(SandboxError::OutsideRoots {
                path: raw.display().to_string(),
            });
        };

        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            warn!(path = %raw.display(), resolved = %resolved.display(), "Sandbox violation");
            Err(SandboxError::OutsideRoots {
                path: raw.display().to_string(),
            })
        }
    }

    /// Render a validated path relative to the root that contains it.
    pub fn display_path(&self, resolved: &Path) -> String {
        self.roots
            .iter()
            .find_map(|root| resolved.strip_prefix(root).ok())
            .map(|rel| {
                if rel.as_os_str().is_empty() {
                    ".".to_string()
                } else {
                    rel.display().to_string()
                }
            })
            .unwrap_or_else(|| resolved.display().to_string())
    }

    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String, SandboxError> {
        let resolved = self.validate_path(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| SandboxError::io(&resolved, e))
    }

    /// Write `content`, creating parent directories as needed.
    ///
    /// New files get mode 0o600 and new directories 0o700 on Unix.
    /// Returns the resolved path that was written.
    pub async fn write_file(
        &self,
        path: impl AsRef<Path>,
        content: &str,
    ) -> Result<PathBuf, SandboxError> {
        let resolved = self.validate_path(path)?;

        if let Some(parent) = resolved.parent()
            && !parent.exists()
        {
            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o700);
            builder
                .create(parent)
                .await
                .map_err(|e| SandboxError::io(parent, e))?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&resolved)
            .await
            .map_err(|e| SandboxError::io(&resolved, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| SandboxError::io(&resolved, e))?;
        file.flush().await.map_err(|e| SandboxError::io(&resolved, e))?;

        debug!(path = %resolved.display(), bytes = content.len(), "File written");
        Ok(resolved)
    }

    /// List a single directory, directories first then by name.
    pub async fn list_dir(&self, path: impl AsRef<Path>) -> Result<Vec<DirEntryInfo>, SandboxError> {
        let resolved = self.validate_path(path)?;
        let mut reader = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| SandboxError::io(&resolved, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| SandboxError::io(&resolved, e))?
        {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    debug!(entry = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }
}

/// Collapse `.` and `..` without touching the filesystem. `..` never
/// climbs above the filesystem root.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.parent().is_some() {
                    out.pop();
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest ancestor that exists and re-append the rest.
///
/// A dangling symlink on the way up cannot be canonicalized, so it is
/// followed by hand and the result resolved again. Returns `None` after
/// `hops` links, which covers symlink loops.
fn resolve_existing_prefix(path: &Path, hops: u32) -> Option<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in tail.iter().rev() {
                resolved.push(part);
            }
            return Some(resolved);
        }

        let is_link = existing
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            if hops == 0 {
                return None;
            }
            let target = std::fs::read_link(&existing).ok()?;
            let base = existing.parent().unwrap_or_else(|| Path::new("/"));
            let mut next = lexical_clean(&base.join(target));
            for part in tail.iter().rev() {
                next.push(part);
            }
            return resolve_existing_prefix(&lexical_clean(&next), hops - 1);
        }

        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                existing = parent.to_path_buf();
            }
            _ => return Some(path.to_path_buf()),
        }
    }
}
