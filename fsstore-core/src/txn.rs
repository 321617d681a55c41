//! Transaction engine (§4.3): atomic multi-file commits for directory-mode
//! entity sets, and a durable single-line append for flat-mode ones.
//!
//! A directory-mode insert or update never writes into the final location
//! directly. It stages every file under a `~`-prefixed sibling directory,
//! drops a zero-byte `.commit` marker once every file has landed, then does
//! the rename(s) that make it visible. The marker is the only thing that
//! distinguishes a finished commit from a write interrupted mid-flight - a
//! staging directory with no marker is garbage from a crash and is deleted
//! wholesale on the next startup scan, never partially applied.
//!
//! Naming: an insert stages to `~~{new}` (no prior document to replace); an
//! update or rename stages to `~{new}~{old}` so recovery knows which old
//! directory to remove before the rename. Flat mode has no staging step -
//! a record is just appended - so a torn write there is a malformed trailing
//! line, which the codec already discards on replay.

use std::path::{Path, PathBuf};

use fsstore_common::{Error, Result};
use tokio::io::AsyncWriteExt;

use crate::codec::{FileBody, StagedFile};

pub const COMMIT_MARKER: &str = ".commit";

/// An in-progress directory-mode commit. Call [`write_files`](Self::write_files)
/// to stage content, then either [`commit`](Self::commit) or [`abort`](Self::abort).
pub struct DirectoryStaging {
    base: PathBuf,
    staging_dir: PathBuf,
    new_name: String,
    old_name: Option<String>,
}

impl DirectoryStaging {
    /// Begin staging an insert: no prior directory to remove on commit.
    pub async fn begin_insert(base: &Path, new_name: &str) -> Result<Self> {
        let staging_dir = base.join(staging_name(new_name, None));
        tokio::fs::create_dir_all(&staging_dir).await.map_err(Error::Io)?;
        Ok(Self { base: base.to_path_buf(), staging_dir, new_name: new_name.to_string(), old_name: None })
    }

    /// Begin staging an update (including a publicKey rename): the old
    /// directory is removed as part of the same commit.
    pub async fn begin_update(base: &Path, new_name: &str, old_name: &str) -> Result<Self> {
        let staging_dir = base.join(staging_name(new_name, Some(old_name)));
        tokio::fs::create_dir_all(&staging_dir).await.map_err(Error::Io)?;
        Ok(Self {
            base: base.to_path_buf(),
            staging_dir,
            new_name: new_name.to_string(),
            old_name: Some(old_name.to_string()),
        })
    }

    pub async fn write_files(&self, files: &[StagedFile]) -> Result<()> {
        for file in files {
            let path = self.staging_dir.join(&file.name);
            match &file.body {
                FileBody::Text(text) => tokio::fs::write(&path, text.as_bytes()).await.map_err(Error::Io)?,
                FileBody::Bytes(bytes) => tokio::fs::write(&path, bytes).await.map_err(Error::Io)?,
            }
        }
        Ok(())
    }

    /// Drop the commit marker, then finalize: remove the old directory (if
    /// any) and rename the staging directory into place. Returns the final
    /// directory path.
    pub async fn commit(self) -> Result<PathBuf> {
        let marker = self.staging_dir.join(COMMIT_MARKER);
        tokio::fs::File::create(&marker).await.map_err(Error::Io)?;
        finalize(&self.base, &self.staging_dir, &self.new_name, self.old_name.as_deref()).await
    }

    /// Discard a staged commit without making it visible.
    pub async fn abort(self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.staging_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn staging_name(new_name: &str, old_name: Option<&str>) -> String {
    match old_name {
        Some(old) => format!("~{new_name}~{old}"),
        None => format!("~~{new_name}"),
    }
}

/// Parse a `~`-prefixed staging directory name back into `(new, old)`.
/// Returns `None` for anything that doesn't match either staging shape,
/// which callers treat as an unrecognized entry rather than garbage to wipe.
fn parse_staging_name(name: &str) -> Option<(String, Option<String>)> {
    let rest = name.strip_prefix('~')?;
    if let Some(new) = rest.strip_prefix('~') {
        if new.is_empty() {
            return None;
        }
        return Some((new.to_string(), None));
    }
    let mut parts = rest.splitn(2, '~');
    let new = parts.next()?.to_string();
    let old = parts.next()?.to_string();
    if new.is_empty() || old.is_empty() {
        return None;
    }
    Some((new, Some(old)))
}

async fn finalize(base: &Path, staging_dir: &Path, new_name: &str, old_name: Option<&str>) -> Result<PathBuf> {
    if let Some(old) = old_name {
        let old_dir = base.join(old);
        if tokio::fs::try_exists(&old_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&old_dir).await.map_err(Error::Io)?;
        }
    }
    let marker = staging_dir.join(COMMIT_MARKER);
    if tokio::fs::try_exists(&marker).await.unwrap_or(false) {
        tokio::fs::remove_file(&marker).await.map_err(Error::Io)?;
    }
    let final_dir = base.join(new_name);
    tokio::fs::rename(staging_dir, &final_dir).await.map_err(Error::Io)?;
    Ok(final_dir)
}

/// Startup recovery for a directory-mode entity set (§4.3, §8 scenarios 5-6):
/// finalize every staging directory that carries a commit marker, and delete
/// every one that doesn't.
pub async fn recover_directory_set(base: &Path) -> Result<()> {
    if !tokio::fs::try_exists(base).await.unwrap_or(false) {
        return Ok(());
    }
    let mut entries = tokio::fs::read_dir(base).await.map_err(Error::Io)?;
    while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('~') {
            continue;
        }
        let path = entry.path();
        let Some((new_name, old_name)) = parse_staging_name(&name) else {
            tracing::warn!(entry = %name, "unrecognized staging entry at startup, leaving in place");
            continue;
        };

        let marker = path.join(COMMIT_MARKER);
        if tokio::fs::try_exists(&marker).await.unwrap_or(false) {
            tracing::info!(entry = %name, "finalizing committed staging directory found at startup");
            finalize(base, &path, &new_name, old_name.as_deref()).await?;
        } else {
            tracing::info!(entry = %name, "removing incomplete staging directory found at startup");
            tokio::fs::remove_dir_all(&path).await.map_err(Error::Io)?;
        }
    }
    Ok(())
}

/// Append one record line to a flat-mode entity set's file. `fsync`s the
/// write so a crash immediately after leaves, at worst, a torn trailing
/// line - which the flat codec already treats as malformed and skips.
pub async fn append_flat_record(path: &Path, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(Error::Io)?;
    file.write_all(line.as_bytes()).await.map_err(Error::Io)?;
    file.write_all(b"\n").await.map_err(Error::Io)?;
    file.flush().await.map_err(Error::Io)?;
    file.sync_data().await.map_err(Error::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_staging_name() {
        assert_eq!(parse_staging_name("~~alice"), Some(("alice".to_string(), None)));
    }

    #[test]
    fn parses_update_staging_name() {
        assert_eq!(
            parse_staging_name("~alice~bob"),
            Some(("alice".to_string(), Some("bob".to_string())))
        );
    }

    #[test]
    fn rejects_non_staging_names() {
        assert_eq!(parse_staging_name("alice"), None);
        assert_eq!(parse_staging_name("~"), None);
        assert_eq!(parse_staging_name("~~"), None);
    }

    #[tokio::test]
    async fn insert_commit_creates_final_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staging = DirectoryStaging::begin_insert(dir.path(), "alice").await.unwrap();
        staging.write_files(&[StagedFile::text("config.json", "{}")]).await.unwrap();
        let final_dir = staging.commit().await.unwrap();
        assert!(final_dir.join("config.json").exists());
        assert!(!final_dir.join(COMMIT_MARKER).exists());
    }

    #[tokio::test]
    async fn update_commit_removes_old_directory() {
        let dir = tempfile::tempdir().unwrap();
        let old = DirectoryStaging::begin_insert(dir.path(), "bob").await.unwrap();
        old.write_files(&[StagedFile::text("config.json", "{}")]).await.unwrap();
        old.commit().await.unwrap();
        assert!(dir.path().join("bob").exists());

        let staging = DirectoryStaging::begin_update(dir.path(), "alice", "bob").await.unwrap();
        staging.write_files(&[StagedFile::text("config.json", "{}")]).await.unwrap();
        staging.commit().await.unwrap();

        assert!(!dir.path().join("bob").exists());
        assert!(dir.path().join("alice").join("config.json").exists());
    }

    #[tokio::test]
    async fn recovery_finalizes_committed_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staging_dir = dir.path().join("~~alice");
        tokio::fs::create_dir_all(&staging_dir).await.unwrap();
        tokio::fs::write(staging_dir.join("config.json"), "{}").await.unwrap();
        tokio::fs::File::create(staging_dir.join(COMMIT_MARKER)).await.unwrap();

        recover_directory_set(dir.path()).await.unwrap();

        assert!(dir.path().join("alice").exists());
        assert!(!staging_dir.exists());
    }

    #[tokio::test]
    async fn recovery_deletes_uncommitted_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staging_dir = dir.path().join("~~alice");
        tokio::fs::create_dir_all(&staging_dir).await.unwrap();
        tokio::fs::write(staging_dir.join("config.json"), "{}").await.unwrap();

        recover_directory_set(dir.path()).await.unwrap();

        assert!(!dir.path().join("alice").exists());
        assert!(!staging_dir.exists());
    }
}
