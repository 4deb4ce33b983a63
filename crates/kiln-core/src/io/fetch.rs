//! Source materialization: checksummed archives and pinned git revisions.
//!
//! The executor only sees the [`SourceFetcher`] trait. [`DefaultFetcher`]
//! downloads `http(s)` archives with streaming SHA256 verification into a
//! content-addressed cache, accepts local paths and `file://` URLs, and
//! checks out git sources at their pinned commit.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use kiln_schema::{Resource, Sha256Digest, SourceRef};

use super::extract::{self, ExtractError};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hash mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("git {action} failed for {url}: {output}")]
    Git {
        url: String,
        action: &'static str,
        output: String,
    },

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Host-provided packages have no source to fetch")]
    HostSource,
}

/// Result of materializing a source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    /// Commit actually checked out, for git sources.
    pub revision: Option<String>,
}

/// Materializes a [`SourceRef`] into a local directory.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Populate `dest` with the source tree described by `source`.
    async fn fetch(&self, source: &SourceRef, dest: &Path) -> Result<Fetched, FetchError>;

    /// Populate `dest` with an auxiliary resource archive.
    async fn fetch_resource(&self, resource: &Resource, dest: &Path) -> Result<(), FetchError> {
        let source = SourceRef::Archive {
            url: resource.url.clone(),
            sha256: resource.sha256.clone(),
        };
        self.fetch(&source, dest).await.map(|_| ())
    }
}

/// Default fetcher backed by `reqwest`, the local filesystem and `git`.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    client: Client,
    cache_dir: PathBuf,
}

impl DefaultFetcher {
    pub fn new(client: Client, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    /// Make sure a verified copy of the archive exists locally and return its path.
    async fn obtain_archive(&self, url: &str, sha256: &Sha256Digest) -> Result<PathBuf, FetchError> {
        if let Some(local) = local_path(url) {
            let actual = hash_file_blocking(local.clone()).await?;
            if !sha256.matches(&actual) {
                return Err(FetchError::HashMismatch {
                    url: url.to_string(),
                    expected: sha256.to_string(),
                    actual,
                });
            }
            return Ok(local);
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let cached = self.cache_dir.join(sha256.as_str());

        if cached.exists() {
            let actual = hash_file_blocking(cached.clone()).await?;
            if sha256.matches(&actual) {
                tracing::debug!("Cache hit for {url}");
                return Ok(cached);
            }
            tracing::warn!("Discarding corrupt cache entry {}", cached.display());
            tokio::fs::remove_file(&cached).await?;
        }

        self.download(url, sha256, &cached).await?;
        Ok(cached)
    }

    /// Stream `url` to `dest`, hashing as we go. The file only appears at
    /// `dest` once the digest has been verified.
    async fn download(&self, url: &str, sha256: &Sha256Digest, dest: &Path) -> Result<(), FetchError> {
        let partial = dest.with_extension("part");
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(&partial).await?;
        let mut hasher = Sha256::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if !sha256.matches(&actual) {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(FetchError::HashMismatch {
                url: url.to_string(),
                expected: sha256.to_string(),
                actual,
            });
        }

        tokio::fs::rename(&partial, dest).await?;
        Ok(())
    }

    async fn checkout(&self, url: &str, revision: &str, dest: &Path) -> Result<Fetched, FetchError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let dest_str = dest.to_string_lossy().to_string();
        git(url, "clone", &["clone", "--quiet", url, &dest_str], None).await?;
        git(url, "checkout", &["checkout", "--quiet", revision], Some(dest)).await?;
        let head = git(url, "rev-parse", &["rev-parse", "HEAD"], Some(dest)).await?;

        Ok(Fetched {
            revision: Some(head.trim().to_string()),
        })
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, source: &SourceRef, dest: &Path) -> Result<Fetched, FetchError> {
        match source {
            SourceRef::Archive { url, sha256 } => {
                let archive = self.obtain_archive(url, sha256).await?;
                let hint = url.clone();
                let dest = dest.to_path_buf();
                tokio::task::spawn_blocking(move || extract::extract_source(&archive, &hint, &dest))
                    .await
                    .map_err(std::io::Error::other)??;
                Ok(Fetched::default())
            }
            SourceRef::Git { git, revision, .. } => self.checkout(git, revision, dest).await,
            SourceRef::Host { .. } => Err(FetchError::HostSource),
        }
    }
}

/// Run a git subcommand, returning stdout on success.
async fn git(url: &str, action: &'static str, args: &[&str], cwd: Option<&Path>) -> Result<String, FetchError> {
    let mut cmd = Command::new("git");
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(FetchError::Git {
            url: url.to_string(),
            action,
            output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// `file:///x.tar.gz` and plain paths point at local archives.
fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(rest) = url.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }
    Some(PathBuf::from(url))
}

/// SHA256 of a file as lowercase hex.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

async fn hash_file_blocking(path: PathBuf) -> Result<String, FetchError> {
    let hash = tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(std::io::Error::other)??;
    Ok(hash)
}
