use std::sync::Arc;
use tokio::sync::watch;

use crate::alert::AlertLevel;

/// Externally visible state of the listening cycle.
#[derive(Debug, Clone, serde::Serialize, PartialEq)]
pub enum CycleStatus {
    Idle,
    Recording { clip: String },
    Processing { clip: String },
    Detection {
        label: String,
        confidence: f64,
        message: String,
        level: AlertLevel,
    },
    Error { message: String },
}

pub struct StatusTracker {
    sender: Arc<watch::Sender<CycleStatus>>,
    receiver: watch::Receiver<CycleStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(CycleStatus::Idle);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn update(&self, status: CycleStatus) {
        let _ = self.sender.send(status);
    }

    pub fn subscribe(&self) -> watch::Receiver<CycleStatus> {
        self.receiver.clone()
    }

    pub fn current(&self) -> CycleStatus {
        self.receiver.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.receiver.borrow().clone(),
            CycleStatus::Recording { .. } | CycleStatus::Processing { .. }
        )
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
