//! Snapshot writer for matched posts.
//!
//! Each flush produces one new file holding a pretty-printed JSON array:
//!
//! ```text
//! <output_dir>/posts_<platform>_<YYYYMMDD_HHMMSS>.json
//! <output_dir>/posts_<platform>_<YYYYMMDD_HHMMSS>_1.json   (same second)
//! ```
//!
//! Files are opened with create-new semantics, so an existing snapshot is
//! never overwritten, appended to or merged.

use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use plume_core::MatchedPost;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Name collisions tried before giving up on a timestamp.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Configuration for the snapshot writer.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Directory to write snapshots to.
    /// Default: current directory
    pub output_dir: PathBuf,

    /// Platform label embedded in file names.
    /// Default: "bluesky"
    pub platform: String,

    /// Prefix for snapshot file names.
    /// Default: "posts"
    pub prefix: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            platform: "bluesky".to_string(),
            prefix: "posts".to_string(),
        }
    }
}

/// A snapshot file that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub post_count: usize,
}

/// Writes buffered matches to timestamped JSON files.
#[derive(Debug)]
pub struct SnapshotWriter {
    config: SnapshotConfig,
}

impl SnapshotWriter {
    /// Create a writer, creating the output directory if needed.
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir)?;

        info!(
            "SnapshotWriter initialized: output_dir={}, platform={}",
            config.output_dir.display(),
            config.platform
        );

        Ok(Self { config })
    }

    /// Write `posts` to a new file stamped with the current local time.
    ///
    /// Returns `None` without touching the filesystem when `posts` is empty.
    pub fn write(&self, posts: &[MatchedPost]) -> Result<Option<Snapshot>> {
        self.write_at(posts, Local::now())
    }

    /// Like [`write`](Self::write) with an explicit timestamp.
    pub fn write_at(
        &self,
        posts: &[MatchedPost],
        now: DateTime<Local>,
    ) -> Result<Option<Snapshot>> {
        if posts.is_empty() {
            return Ok(None);
        }

        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let (path, file) = self.create_unique(&stamp)?;

        debug!("Writing {} posts to {}", posts.len(), path.display());

        if let Err(e) = write_json(file, posts) {
            // Leave no half-written snapshot behind; the posts stay buffered.
            if let Err(rm) = fs::remove_file(&path) {
                warn!("Failed to remove partial snapshot {}: {}", path.display(), rm);
            }
            return Err(e);
        }

        info!("Saved {} posts to {}", posts.len(), path.display());

        Ok(Some(Snapshot {
            path,
            post_count: posts.len(),
        }))
    }

    fn snapshot_path(&self, stamp: &str, attempt: u32) -> PathBuf {
        let suffix = if attempt == 0 {
            String::new()
        } else {
            format!("_{attempt}")
        };
        self.config.output_dir.join(format!(
            "{}_{}_{}{}.json",
            self.config.prefix, self.config.platform, stamp, suffix
        ))
    }

    fn create_unique(&self, stamp: &str) -> Result<(PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.snapshot_path(stamp, attempt);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Snapshot(format!(
            "no free file name for timestamp {stamp} after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }
}

fn write_json(file: File, posts: &[MatchedPost]) -> Result<()> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, posts)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?
        .sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_post(n: u32) -> MatchedPost {
        MatchedPost {
            detected_at: "2024-05-01 09:30:05".to_string(),
            author_did: "did:plc:alice".to_string(),
            text: format!("Pesquisa {n}"),
            keywords_found: vec!["Pesquisa".to_string()],
            post_uri: format!("at://did:plc:alice/app.bsky.feed.post/{n}"),
            created_at: None,
            reply_to: None,
            embeds: None,
            facets: None,
            languages: Some(vec!["pt".to_string()]),
            cid: "bafyreiexample".to_string(),
            path: format!("app.bsky.feed.post/{n}"),
        }
    }

    fn writer(tmp: &TempDir) -> SnapshotWriter {
        SnapshotWriter::new(SnapshotConfig {
            output_dir: tmp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap()
    }

    #[test]
    fn test_snapshot_file_name() {
        let tmp = TempDir::new().unwrap();
        let snapshot = writer(&tmp)
            .write_at(&[test_post(1)], fixed_time())
            .unwrap()
            .unwrap();

        assert_eq!(
            snapshot.path,
            tmp.path().join("posts_bluesky_20240501_093005.json")
        );
        assert_eq!(snapshot.post_count, 1);
    }

    #[test]
    fn test_snapshot_contents() {
        let tmp = TempDir::new().unwrap();
        let posts = vec![test_post(1), test_post(2)];
        let snapshot = writer(&tmp).write(&posts).unwrap().unwrap();

        let raw = fs::read_to_string(&snapshot.path).unwrap();
        assert!(raw.contains("\n  "), "expected indented JSON");
        let parsed: Vec<MatchedPost> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, posts);
    }

    #[test]
    fn test_empty_write_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(writer(&tmp).write(&[]).unwrap(), None);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_same_second_does_not_overwrite() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);
        let first = writer
            .write_at(&[test_post(1)], fixed_time())
            .unwrap()
            .unwrap();
        let second = writer
            .write_at(&[test_post(2)], fixed_time())
            .unwrap()
            .unwrap();
        let third = writer
            .write_at(&[test_post(3)], fixed_time())
            .unwrap()
            .unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(
            second.path,
            tmp.path().join("posts_bluesky_20240501_093005_1.json")
        );
        assert_eq!(
            third.path,
            tmp.path().join("posts_bluesky_20240501_093005_2.json")
        );

        let first_posts: Vec<MatchedPost> =
            serde_json::from_str(&fs::read_to_string(&first.path).unwrap()).unwrap();
        assert_eq!(first_posts[0].text, "Pesquisa 1");
    }

    #[test]
    fn test_custom_platform_and_dir_creation() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/out");
        let writer = SnapshotWriter::new(SnapshotConfig {
            output_dir: dir.clone(),
            platform: "test".to_string(),
            ..Default::default()
        })
        .unwrap();
        let snapshot = writer
            .write_at(&[test_post(1)], fixed_time())
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.path, dir.join("posts_test_20240501_093005.json"));
    }
}
