//! Colors and icons shared by every renderer.

use crossterm::style::Color;

#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
    /// Width of the package name column.
    pub name_width: usize,
    /// Width of the version column.
    pub version_width: usize,
}

impl Theme {
    pub fn new() -> Self {
        Self {
            name_width: 16,
            version_width: 12,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub package_name: Color,
    pub version: Color,
    pub secondary: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub active: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            package_name: Color::Cyan,
            version: Color::White,
            secondary: Color::DarkGrey,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            active: Color::Blue,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Icons {
    /// Queued (○)
    pub pending: &'static str,
    /// In progress (●)
    pub active: &'static str,
    /// Completed (✓)
    pub success: &'static str,
    /// Failed (✗)
    pub error: &'static str,
    /// Warning (⚠)
    pub warning: &'static str,
    /// Info (ℹ)
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            pending: "○",
            active: "●",
            success: "✓",
            error: "✗",
            warning: "⚠",
            info: "ℹ",
        }
    }
}

/// Format a duration in seconds for summaries: `0.4s`, `12.0s`, `3m 05s`.
pub fn format_elapsed(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let whole = secs.round() as u64;
        format!("{}m {:02}s", whole / 60, whole % 60)
    }
}
