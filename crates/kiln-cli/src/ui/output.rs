//! Unified UI output interface.
//!
//! Commands and the executor's [`Reporter`] hooks send events here; the actor
//! renders them in order.

use std::sync::{OnceLock, mpsc};

use kiln_core::Reporter;
use kiln_schema::{PackageName, Version};

use super::actor::{UiActor, UiEvent};

static UI_ACTOR: OnceLock<mpsc::Sender<UiEvent>> = OnceLock::new();

fn get_actor_sender() -> mpsc::Sender<UiEvent> {
    UI_ACTOR
        .get_or_init(|| {
            let actor = UiActor::spawn();
            let sender = actor.sender();

            // Keep actor alive for program duration
            std::mem::forget(actor);

            sender
        })
        .clone()
}

/// A cloneable handle for sending UI events to the terminal actor.
#[derive(Debug, Clone)]
pub struct Output {
    sender: mpsc::Sender<UiEvent>,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            sender: get_actor_sender(),
        }
    }

    fn send(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }

    /// Block until all pending UI events are processed.
    pub fn wait(&self) {
        let (tx, rx) = mpsc::channel();
        self.send(UiEvent::Sync(tx));
        let _ = rx.recv();
    }
}

impl Reporter for Output {
    fn prepare_plan(&self, packages: &[(PackageName, Version)]) {
        self.send(UiEvent::PreparePlan {
            items: packages
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        });
    }

    fn section(&self, title: &str) {
        self.send(UiEvent::PrintHeader {
            title: title.to_string(),
        });
    }

    fn fetching(&self, name: &PackageName, version: &Version) {
        self.send(UiEvent::Fetching {
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    fn building(&self, name: &PackageName, version: &Version, step: usize, total: usize, label: &str) {
        self.send(UiEvent::Building {
            name: name.to_string(),
            version: version.to_string(),
            step,
            total,
            label: label.to_string(),
        });
    }

    fn verifying(&self, name: &PackageName, version: &Version) {
        self.send(UiEvent::Verifying {
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    fn removing(&self, name: &PackageName, version: &Version) {
        self.send(UiEvent::Removing {
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        self.send(UiEvent::Done {
            name: name.to_string(),
            version: version.to_string(),
            detail: detail.to_string(),
        });
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        self.send(UiEvent::Failed {
            name: name.to_string(),
            version: version.to_string(),
            reason: reason.to_string(),
        });
    }

    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        self.send(UiEvent::Skipped {
            name: name.to_string(),
            version: version.to_string(),
            reason: reason.to_string(),
        });
    }

    fn info(&self, msg: &str) {
        self.send(UiEvent::Info(msg.to_string()));
    }

    fn success(&self, msg: &str) {
        self.send(UiEvent::Success(msg.to_string()));
    }

    fn warning(&self, msg: &str) {
        self.send(UiEvent::Warning(msg.to_string()));
    }

    fn error(&self, msg: &str) {
        self.send(UiEvent::Error(msg.to_string()));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        self.send(UiEvent::Summary {
            count,
            action: action.to_string(),
            elapsed_secs,
        });
    }
}
