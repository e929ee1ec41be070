//! Common test utilities and helpers for ReleaseSentry tests
#![allow(dead_code)]

use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use releasesentry::{FetchError, NotificationTransport, NotifyError, ReleaseSource, RepoSlug};

/// Temp directory holding a config file, restoring touched env vars on drop
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub original_env: Vec<(String, Option<String>)>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let env_vars = ["GITHUB_TOKEN", "GITHUB_RELEASE_MONITOR_CONFIG"];
        let original_env = env_vars
            .iter()
            .map(|var| (var.to_string(), env::var(var).ok()))
            .collect();

        Self {
            temp_dir,
            original_env,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.child("config.yml").path().to_path_buf()
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config = self.temp_dir.child("config.yml");
        config.write_str(content).expect("Failed to write test config");
        config.path().to_path_buf()
    }

    pub fn read_config(&self) -> String {
        std::fs::read_to_string(self.config_path()).expect("Failed to read config")
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        for (key, value) in &self.original_env {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

/// Release source answering from a fixed table; unknown slugs have no release
#[derive(Default)]
pub struct FakeReleaseSource {
    tags: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl FakeReleaseSource {
    pub fn new(tags: &[(&str, &str)]) -> Self {
        Self {
            tags: tags
                .iter()
                .map(|(slug, tag)| (slug.to_string(), tag.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    async fn latest_release_tag(&self, slug: &RepoSlug) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tags
            .get(&slug.to_string())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(slug.to_string()))
    }
}

/// Transport that records every (url, message) pair it is given
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages_for(&self, url: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(u, _)| u == url)
            .map(|(_, m)| m)
            .collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, url: &str, message: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), message.to_string()));
        Ok(())
    }
}

/// Assertion helper for log and file contents
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
