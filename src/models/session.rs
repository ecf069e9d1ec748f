use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Activity state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Output is streaming right now
    Active,
    /// Prompt is visible, nothing pending
    Idle,
    /// A question or y/n confirmation is on screen
    Waiting,
    /// Plain terminal process outside tmux (read-only)
    Terminal,
    #[default]
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
            SessionStatus::Waiting => "waiting",
            SessionStatus::Terminal => "terminal",
            SessionStatus::Unknown => "unknown",
        }
    }

    /// Status with its icon, for list display.
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Active => "● active",
            SessionStatus::Idle => "○ idle",
            SessionStatus::Waiting => "◎ waiting",
            SessionStatus::Terminal => "⊘ terminal",
            SessionStatus::Unknown => "? unknown",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed line of `tmux list-sessions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTmuxSession {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub attached: bool,
    pub window_count: u32,
    pub last_activity_at: DateTime<Utc>,
    pub working_directory: String,
}

/// A Claude Code session as presented to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    /// Display label derived from the name or working directory
    pub project: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub attached: bool,
    pub process_id: Option<u32>,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub working_directory: String,
    /// true = tmux session (attach/kill allowed), false = terminal process (read-only)
    pub managed: bool,
}

impl Session {
    /// Human-readable uptime: `42s`, `5m`, `3h12m`, `2d4h`.
    pub fn uptime(&self, now: DateTime<Utc>) -> String {
        let Some(started_at) = self.started_at else {
            return "-".to_string();
        };

        let secs = now.signed_duration_since(started_at).num_seconds().max(0);
        if secs < 60 {
            return format!("{}s", secs);
        }
        let mins = secs / 60;
        if mins < 60 {
            return format!("{}m", mins);
        }
        let hours = mins / 60;
        if hours < 24 {
            return format!("{}h{}m", hours, mins % 60);
        }
        format!("{}d{}h", hours / 24, hours % 24)
    }
}

/// Derive a project label from a session name or its path.
///
/// Managed names (`<prefix>foo`) yield `foo`; otherwise the last path
/// component; otherwise the name itself.
pub fn extract_project(name: &str, path: &str, prefix: &str) -> String {
    if !prefix.is_empty() {
        if let Some(project) = name.strip_prefix(prefix) {
            return project.to_string();
        }
    }

    last_path_component(path).unwrap_or_else(|| name.to_string())
}

/// Last non-empty component of a `/`-separated path.
pub fn last_path_component(path: &str) -> Option<String> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
