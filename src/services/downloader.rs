//! Download dispatch seam
//!
//! The scan job hands accepted releases to a [`DownloadDispatcher`]. The
//! dispatcher returns the download client's task id, or `None` when the
//! client declined the release.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::services::candidate::ResolvedCandidate;

#[async_trait]
pub trait DownloadDispatcher: Send + Sync {
    async fn submit(
        &self,
        enclosure_url: &str,
        target_dir: Option<&str>,
        metadata: &ResolvedCandidate,
    ) -> Result<Option<String>>;
}

/// A submission recorded by [`LoggingDispatcher`]
#[derive(Debug, Clone)]
pub struct Submission {
    pub task_id: String,
    pub enclosure_url: String,
    pub target_dir: Option<PathBuf>,
    pub title: String,
}

/// Dispatcher that logs and remembers submissions instead of talking to a client
#[derive(Debug, Default)]
pub struct LoggingDispatcher {
    submissions: Mutex<Vec<Submission>>,
}

impl LoggingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl DownloadDispatcher for LoggingDispatcher {
    async fn submit(
        &self,
        enclosure_url: &str,
        target_dir: Option<&str>,
        metadata: &ResolvedCandidate,
    ) -> Result<Option<String>> {
        let task_id = Uuid::new_v4().to_string();
        info!(
            task_id = %task_id,
            title = %metadata.parsed.raw_title,
            site = %metadata.site_identity,
            target_dir = ?target_dir,
            "Release submitted for download"
        );
        self.submissions.lock().push(Submission {
            task_id: task_id.clone(),
            enclosure_url: enclosure_url.to_string(),
            target_dir: target_dir.map(PathBuf::from),
            title: metadata.parsed.raw_title.clone(),
        });
        Ok(Some(task_id))
    }
}
