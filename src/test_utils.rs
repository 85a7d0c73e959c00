//! Shared helpers for the crate's tests.
#![allow(clippy::unwrap_used)]
#![allow(dead_code)]

use crate::errors::{Error, Result};
use crate::release::{ReleaseAsset, ReleaseDescriptor, ReleaseSource};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

/// A managed-process stand-in that stays alive until it is stopped.
pub(crate) const SLEEPER_SCRIPT: &str = "#!/bin/sh\nsleep 30\n";

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer() // Crucial for `cargo test` output
        .try_init(); // Use try_init to avoid panic if already initialized
}

/// A fresh scratch directory under the system temp dir, unique per call.
pub(crate) fn scratch_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "ul-test-{}-{label}-{unique}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Writes an executable shell script to `path`.
#[cfg(unix)]
pub(crate) fn write_script(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A release descriptor with zero-sized assets, enough for matching and
/// update-orchestration tests.
pub(crate) fn release_fixture(tag: &str, asset_names: &[&str]) -> ReleaseDescriptor {
    ReleaseDescriptor {
        tag: tag.to_owned(),
        assets: asset_names
            .iter()
            .map(|name| ReleaseAsset {
                name: (*name).to_owned(),
                download_url: format!("https://example.invalid/{name}"),
                size: 0,
            })
            .collect(),
    }
}

/// [`ReleaseSource`] serving a canned feed, counting calls.
pub(crate) struct StubSource {
    feed: Mutex<Option<ReleaseDescriptor>>,
    payload: Vec<u8>,
    pub(crate) find_calls: AtomicUsize,
    pub(crate) download_calls: AtomicUsize,
}

impl StubSource {
    /// A source whose downloads always yield `payload`; the feed starts
    /// empty (every check reports `NotFound`).
    pub(crate) fn new(payload: &[u8]) -> Self {
        Self {
            feed: Mutex::new(None),
            payload: payload.to_vec(),
            find_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        }
    }

    /// Replaces the feed's latest release.
    pub(crate) fn publish(&self, descriptor: ReleaseDescriptor) {
        *self.feed.lock().unwrap() = Some(descriptor);
    }
}

impl ReleaseSource for StubSource {
    async fn find_latest(&self) -> Result<ReleaseDescriptor> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.feed.lock().unwrap().clone().ok_or(Error::NotFound)
    }

    async fn download(&self, _asset: &ReleaseAsset) -> Result<Vec<u8>> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}
