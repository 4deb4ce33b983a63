//! UI Actor - Single-threaded event processing
//!
//! Every terminal write goes through one thread, so build workers never
//! contend for stdout and lines from concurrent packages stay whole.

use std::io::{Write, stdout};
use std::sync::mpsc;
use std::thread;

use crossterm::style::{Color, Stylize};

use super::theme::Theme;

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// List the packages about to be built
    PreparePlan { items: Vec<(String, String)> },
    /// Print a section header
    PrintHeader { title: String },
    Fetching { name: String, version: String },
    Building {
        name: String,
        version: String,
        step: usize,
        total: usize,
        label: String,
    },
    Verifying { name: String, version: String },
    Removing { name: String, version: String },
    Done {
        name: String,
        version: String,
        detail: String,
    },
    Failed {
        name: String,
        version: String,
        reason: String,
    },
    Skipped {
        name: String,
        version: String,
        reason: String,
    },
    Info(String),
    Success(String),
    Warning(String),
    Error(String),
    /// Print summary with timing
    Summary {
        count: usize,
        action: String,
        elapsed_secs: f64,
    },
    /// Reply once every earlier event has been rendered
    Sync(mpsc::Sender<()>),
    Shutdown,
}

/// Handle to the UI actor thread
#[derive(Debug)]
pub struct UiActor {
    sender: mpsc::Sender<UiEvent>,
    _handle: thread::JoinHandle<()>,
}

impl UiActor {
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_event_loop(&receiver));
        Self {
            sender,
            _handle: handle,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<UiEvent> {
        self.sender.clone()
    }
}

impl Drop for UiActor {
    fn drop(&mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
    }
}

fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>) {
    let theme = Theme::new();

    while let Ok(event) = receiver.recv() {
        let lines = match event {
            UiEvent::Sync(tx) => {
                let _ = stdout().flush();
                let _ = tx.send(());
                continue;
            }
            UiEvent::Shutdown => break,
            event => render(&theme, event),
        };

        let mut out = stdout().lock();
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
    }
}

/// Turn one event into the lines it prints.
pub fn render(theme: &Theme, event: UiEvent) -> Vec<String> {
    let icons = &theme.icons;
    let colors = &theme.colors;

    match event {
        UiEvent::PreparePlan { items } => {
            let mut lines = vec![String::new()];
            lines.extend(items.iter().map(|(name, version)| {
                row(theme, icons.pending, colors.secondary, name, version, "queued")
            }));
            lines.push(String::new());
            lines
        }
        UiEvent::PrintHeader { title } => {
            vec![String::new(), format!("{} {}", title, "─".repeat(40))]
        }
        UiEvent::Fetching { name, version } => {
            vec![row(theme, icons.active, colors.active, &name, &version, "fetching")]
        }
        UiEvent::Building {
            name,
            version,
            step,
            total,
            label,
        } => vec![row(
            theme,
            icons.active,
            colors.active,
            &name,
            &version,
            &format!("[{step}/{total}] {label}"),
        )],
        UiEvent::Verifying { name, version } => {
            vec![row(theme, icons.active, colors.active, &name, &version, "verifying")]
        }
        UiEvent::Removing { name, version } => {
            vec![row(theme, icons.active, colors.active, &name, &version, "removing")]
        }
        UiEvent::Done {
            name,
            version,
            detail,
        } => vec![row(theme, icons.success, colors.success, &name, &version, &detail)],
        UiEvent::Failed {
            name,
            version,
            reason,
        } => {
            let mut reason_lines = reason.lines();
            let first = reason_lines.next().unwrap_or("failed");
            let mut lines = vec![row(theme, icons.error, colors.error, &name, &version, first)];
            lines.extend(reason_lines.map(|l| format!("      {}", l.dark_grey())));
            lines
        }
        UiEvent::Skipped {
            name,
            version,
            reason,
        } => vec![row(
            theme,
            icons.pending,
            colors.secondary,
            &name,
            &version,
            &format!("skipped: {reason}"),
        )],
        UiEvent::Info(msg) => vec![format!("  {} {}", icons.info, msg)],
        UiEvent::Success(msg) => vec![footer(icons.success, colors.success, &msg)],
        UiEvent::Warning(msg) => vec![footer(icons.warning, colors.warning, &msg)],
        UiEvent::Error(msg) => vec![footer(icons.error, colors.error, &msg)],
        UiEvent::Summary {
            count,
            action,
            elapsed_secs,
        } => {
            let msg = format!(
                "{} package{} {} in {}",
                count,
                if count == 1 { "" } else { "s" },
                action,
                super::theme::format_elapsed(elapsed_secs)
            );
            vec![String::new(), footer(icons.success, colors.success, &msg)]
        }
        UiEvent::Sync(_) | UiEvent::Shutdown => Vec::new(),
    }
}

fn row(theme: &Theme, icon: &str, color: Color, name: &str, version: &str, detail: &str) -> String {
    let name_part = format!("{name: <width$}", width = theme.name_width);
    let version_part = format!("{version: <width$}", width = theme.version_width);
    format!(
        "  {} {} {} {}",
        icon.with(color),
        name_part.with(theme.colors.package_name),
        version_part.with(theme.colors.version),
        detail.with(theme.colors.secondary)
    )
}

fn footer(icon: &str, color: Color, msg: &str) -> String {
    format!("{} {}", icon.with(color), msg.with(color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_spans_lines() {
        let lines = render(
            &Theme::new(),
            UiEvent::Failed {
                name: "csxcad".to_string(),
                version: "0.6.3".to_string(),
                reason: "Step 2 (`cmake`) failed with exit code 1\nCMake Error: Boost not found"
                    .to_string(),
            },
        );
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("csxcad"));
        assert!(lines[0].contains("Step 2"));
        assert!(lines[1].contains("Boost not found"));
    }

    #[test]
    fn test_summary_pluralises() {
        let lines = render(
            &Theme::new(),
            UiEvent::Summary {
                count: 1,
                action: "installed".to_string(),
                elapsed_secs: 2.0,
            },
        );
        assert!(lines.iter().any(|l| l.contains("1 package installed in 2.0s")));
    }

    #[test]
    fn test_actor_spawn() {
        let actor = UiActor::spawn();
        actor
            .sender()
            .send(UiEvent::Info("test".to_string()))
            .unwrap();
        drop(actor);
    }
}
