//! Common utilities for tpf-harvest integration tests

#![allow(dead_code)]

#[path = "../../src/fits/test_support.rs"]
mod fits_builder;

pub use fits_builder::*;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tpf_harvest::{Config, MirrorConfig, RetryConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Archive directory served by the mock server
pub const ARCHIVE_PATH: &str = "/missions/k2/target_pixel_files";

/// Configuration pointing at `server`, with an empty mirror and fast retries
pub fn test_config(temp: &TempDir, server: &MockServer) -> Config {
    Config {
        mirror: MirrorConfig {
            remote_prefix: format!("{}{}", server.uri(), ARCHIVE_PATH),
            local_root: temp.path().join("mirror"),
        },
        scratch_dir: temp.path().join("scratch"),
        retry: RetryConfig {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        },
        concurrency: 4,
        data_dir: temp.path().join("data"),
        ..Default::default()
    }
}

/// Public URL of an archive file
pub fn archive_url(server: &MockServer, relative: &str) -> String {
    format!("{}{}/{}", server.uri(), ARCHIVE_PATH, relative)
}

/// Serve a synthetic target pixel file at `relative`
pub async fn serve_tpf(server: &MockServer, relative: &str, keplerid: i64, aperture: &[i32]) {
    let body = FitsBuilder::target_pixel_file(keplerid, aperture).bytes().to_vec();
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", ARCHIVE_PATH, relative)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Serve something that is not a FITS file at `relative`
pub async fn serve_garbage(server: &MockServer, relative: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", ARCHIVE_PATH, relative)))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(server)
        .await;
}

/// Fail every request for `relative` with `status`
pub async fn serve_status(server: &MockServer, relative: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", ARCHIVE_PATH, relative)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// A parsed metadata table
#[derive(Debug)]
pub struct Table {
    pub header: String,
    pub rows: Vec<String>,
}

impl Table {
    /// Read a table written by the aggregator
    pub fn read(path: &Path) -> Table {
        let content = std::fs::read_to_string(path).expect("read table");
        assert!(
            content.is_empty() || content.ends_with('\n'),
            "table must end with a complete line"
        );
        let mut lines = content.lines().map(str::to_string);
        let header = lines.next().unwrap_or_default();
        Table {
            header,
            rows: lines.collect(),
        }
    }

    /// Rows as a set, for comparisons independent of completion order
    pub fn row_set(&self) -> BTreeSet<String> {
        self.rows.iter().cloned().collect()
    }

    /// Value of `field` in every row, looked up through the header
    pub fn column(&self, field: &str) -> Vec<String> {
        let index = self
            .header
            .split(',')
            .position(|name| name == field)
            .unwrap_or_else(|| panic!("no column {field}"));
        self.rows
            .iter()
            .map(|row| row.split(',').nth(index).unwrap_or_default().to_string())
            .collect()
    }
}

/// Files left behind in a directory (absent directory counts as empty)
pub fn leftover_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}
