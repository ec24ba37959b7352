//! Download tasks and the append-only history behind `show_downloads`.
use std::sync::Arc;

use parking_lot::Mutex;

/// Where a download currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Running,
    Failed,
    Complete,
}

#[derive(Debug)]
struct Progress {
    status: DownloadStatus,
    total_pieces: u64,
    completed_pieces: u64,
}

/// One download, observable while it runs. Piece workers bump the completed
/// counter; the engine flips the terminal status exactly once.
#[derive(Debug)]
pub struct DownloadTask {
    group: String,
    name: String,
    progress: Mutex<Progress>,
}

impl DownloadTask {
    #[must_use]
    pub fn new(group: &str, name: &str, total_pieces: u64) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            progress: Mutex::new(Progress {
                status: DownloadStatus::Running,
                total_pieces,
                completed_pieces: 0,
            }),
        }
    }

    pub fn piece_completed(&self) {
        self.progress.lock().completed_pieces += 1;
    }

    pub fn mark_failed(&self) {
        self.progress.lock().status = DownloadStatus::Failed;
    }

    pub fn mark_complete(&self) {
        self.progress.lock().status = DownloadStatus::Complete;
    }

    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.progress.lock().status
    }

    #[must_use]
    pub fn completed_pieces(&self) -> u64 {
        self.progress.lock().completed_pieces
    }

    /// The `show_downloads` line: a terminal tag for finished tasks, a
    /// progress line for running ones.
    #[must_use]
    pub fn render(&self) -> String {
        let progress = self.progress.lock();

        match progress.status {
            DownloadStatus::Complete => format!("[C] {} {}", self.group, self.name),
            DownloadStatus::Failed => format!("[F] {} {}", self.group, self.name),
            DownloadStatus::Running => format!(
                "[R] {} {} ({}/{} pieces completed)",
                self.group, self.name, progress.completed_pieces, progress.total_pieces
            ),
        }
    }
}

/// Append-only record of every download started in this process.
#[derive(Debug, Default)]
pub struct DownloadHistory {
    tasks: Mutex<Vec<Arc<DownloadTask>>>,
}

impl DownloadHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Arc<DownloadTask>) {
        self.tasks.lock().push(task);
    }

    /// The `show_downloads` report, one line per task in start order.
    #[must_use]
    pub fn render(&self) -> String {
        let tasks = self.tasks.lock();

        if tasks.is_empty() {
            return "No download history available.".to_string();
        }

        tasks.iter().map(|task| task.render()).collect::<Vec<_>>().join("\n")
    }
}
