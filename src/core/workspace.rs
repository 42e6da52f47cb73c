use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const WORKSPACE_PREFIX: &str = "judge-";
const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Uniquely named scratch directory owned by exactly one judgment.
///
/// The directory and everything written into it is removed when the
/// workspace is dropped, which covers early returns, panics and task
/// cancellation. `close` does the same but reports removal failures.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    aliases: Vec<String>,
}

impl Workspace {
    /// `acquire` on the blocking pool.
    pub async fn create(root: Option<PathBuf>) -> io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::acquire(root.as_deref()))
            .await
            .map_err(io::Error::other)?
    }

    pub fn acquire(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let mut aliases = vec![dir.path().to_string_lossy().to_string()];
        if let Ok(canonical) = dir.path().canonicalize() {
            let canonical = canonical.to_string_lossy().to_string();
            if !aliases.contains(&canonical) {
                aliases.push(canonical);
            }
        }
        // Longest first so a canonical path is not half-replaced by a shorter alias.
        aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));

        tracing::debug!(path = %dir.path().display(), "workspace acquired");
        Ok(Self { dir, aliases })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub async fn write_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Strips workspace paths out of compiler/runtime output and caps its size,
    /// so diagnostics shown to submitters never leak host file layout.
    pub fn sanitize(&self, text: &str, max_bytes: usize) -> String {
        let mut cleaned = text.to_string();
        for alias in &self.aliases {
            cleaned = cleaned.replace(&format!("{alias}/"), "");
            cleaned = cleaned.replace(alias.as_str(), "");
        }
        truncate(cleaned.trim_end(), max_bytes)
    }

    /// `close` on the blocking pool.
    pub async fn remove(self) -> io::Result<()> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(io::Error::other)?
    }

    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(path = %path.display(), "workspace removed");
        Ok(())
    }
}

/// Cuts `text` to at most `max_bytes` on a char boundary.
pub fn truncate(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}
