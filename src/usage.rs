//! Storage usage accounting.
//!
//! Computes the total on-disk footprint of the storage directory by
//! recursive traversal. Every reporting cycle performs a fresh walk; the
//! result is never cached, trading a bounded amount of I/O (one walk per
//! cycle) for an always-current figure.

use crate::error::Result;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Maximum number of sibling entries sized concurrently.
///
/// Bounds file-descriptor pressure on very wide directories while still
/// overlapping stat latency across siblings.
pub const MAX_SCAN_CONCURRENCY: usize = 16;

/// Compute the total size in bytes of everything reachable under `path`.
///
/// Regular files contribute their byte length; directories contribute
/// their own entry size as reported by the filesystem plus the recursive
/// total of their children. Children of one directory are sized
/// concurrently and summed once all complete.
///
/// An entry that disappears between being listed and being stat'ed is a
/// benign race with the storage engine and contributes zero. Any other
/// I/O error fails the whole computation.
///
/// # Errors
///
/// Returns an error if a directory cannot be listed or an entry cannot
/// be stat'ed for any reason other than no longer existing.
pub fn directory_size(path: PathBuf) -> BoxFuture<'static, Result<u64>> {
    async move {
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        if !meta.is_dir() {
            return Ok(meta.len());
        }

        let mut total = meta.len();

        let mut reader = match fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(total),
            Err(e) => return Err(e.into()),
        };

        let mut children = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            children.push(entry.path());
        }

        total += stream::iter(children)
            .map(directory_size)
            .buffer_unordered(MAX_SCAN_CONCURRENCY)
            .try_fold(0u64, |acc, size| async move { Ok(acc + size) })
            .await?;

        Ok(total)
    }
    .boxed()
}
