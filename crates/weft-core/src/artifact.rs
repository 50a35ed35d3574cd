use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

static STAGING_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// What a file written by the fabric tools holds. Only used to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    TraceJson,
    TraceDiagram,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::TraceJson => f.write_str("trace json"),
            ArtifactKind::TraceDiagram => f.write_str("trace diagram"),
        }
    }
}

/// Replaces `path` with `content` in one rename, so a reader sees either the
/// old file or the whole new one. Missing parent directories are created.
pub fn write_artifact(kind: ArtifactKind, path: &Path, content: &str) -> Result<()> {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        bail!("{kind} path '{}' has no file name", path.display());
    };
    if path.is_dir() {
        bail!("{kind} path '{}' is a directory", path.display());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create {kind} directory {}", dir.display()))?;

    let staged = dir.join(format!(
        ".{file_name}.{}-{}.partial",
        std::process::id(),
        STAGING_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&staged, content)
        .with_context(|| format!("cannot stage {kind} at {}", staged.display()))?;
    if let Err(error) = std::fs::rename(&staged, path) {
        let _ = std::fs::remove_file(&staged);
        return Err(error)
            .with_context(|| format!("cannot move {kind} into place at {}", path.display()));
    }
    Ok(())
}
