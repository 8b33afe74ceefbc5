//! Events emitted by the core to its UI collaborator
//!
//! Workers never touch UI state; they push `DownloadEvent`s into an unbounded
//! channel that the UI thread drains at its own pace.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::fetcher::MediaMetadata;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    Started {
        task_id: String,
        title: String,
        thumbnail_url: String,
    },
    Progress {
        task_id: String,
        percent: f64,
        status_text: String,
    },
    Completed {
        task_id: String,
        title: String,
        output_path: String,
    },
    Failed {
        task_id: String,
        title: String,
        error_message: String,
    },
    Skipped {
        task_id: String,
        reason: String,
    },
    /// Informational, non-authoritative
    Log {
        message: String,
    },
    MetadataFetched {
        url: String,
        metadata: MediaMetadata,
    },
    MetadataFailed {
        url: String,
        error: String,
    },
    /// Every enqueued task reached a terminal state
    QueueDrained,
}

impl DownloadEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Started { task_id, .. }
            | Self::Progress { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Skipped { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Skipped { .. }
        )
    }
}

/// Channel for communication between the download core and UI
pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Fire-and-forget emitter, cheap to clone into every worker thread
#[derive(Clone)]
pub struct EventEmitter {
    sender: EventSender,
}

impl EventEmitter {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }

    pub fn emit(&self, event: DownloadEvent) {
        // A closed receiver only means the UI went away.
        let _ = self.sender.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.emit(DownloadEvent::Log { message });
    }
}
