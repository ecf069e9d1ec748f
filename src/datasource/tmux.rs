use super::runner::{args, CommandError, CommandRunner};
use crate::models::RawTmuxSession;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Field template for `tmux list-sessions -F`.
pub const SESSION_FORMAT: &str = "#{session_name}|#{session_created}|#{session_attached}|#{session_windows}|#{session_activity}|#{session_path}";

const SESSION_FIELDS: usize = 6;

/// Messages tmux prints when there is simply nothing to list
const EMPTY_SERVER_MARKERS: [&str; 4] = [
    "no server running",
    "no current client",
    "no sessions",
    "error connecting to",
];

static VALID_SESSION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid session name regex"));

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("invalid session name {0:?}: only alphanumeric, underscore, and hyphen characters are allowed")]
    InvalidName(String),
    #[error("no pane found for session {0}")]
    NoPane(String),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Reject names that could be misread by tmux target syntax or a shell.
pub fn validate_session_name(name: &str) -> Result<(), TmuxError> {
    if VALID_SESSION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(TmuxError::InvalidName(name.to_string()))
    }
}

/// tmux CLI wrapper
pub struct TmuxClient<R> {
    runner: R,
    tmux_path: String,
}

impl<R: CommandRunner> TmuxClient<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            tmux_path: "tmux".to_string(),
        }
    }

    pub fn with_tmux_path(mut self, path: impl Into<String>) -> Self {
        self.tmux_path = path.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn tmux(&self, args: Vec<String>) -> Result<String, CommandError> {
        self.runner
            .run(&self.tmux_path, &args)
            .await
            .map(|output| output.stdout)
    }

    /// Raw `list-sessions` output; empty when no server is running.
    pub async fn list_sessions_raw(&self) -> Result<String, TmuxError> {
        match self
            .tmux(args(["list-sessions", "-F", SESSION_FORMAT]))
            .await
        {
            Ok(stdout) => Ok(stdout.trim().to_string()),
            Err(CommandError::NotFound { .. }) => {
                tracing::debug!("tmux is not installed");
                Ok(String::new())
            }
            Err(e) => {
                let text = e.output_text();
                if EMPTY_SERVER_MARKERS.iter().any(|m| text.contains(m)) {
                    Ok(String::new())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Parsed session list; no server means no sessions.
    pub async fn list_sessions(&self) -> Result<Vec<RawTmuxSession>, TmuxError> {
        Ok(parse_sessions(&self.list_sessions_raw().await?))
    }

    /// Captured pane text, optionally including `history_lines` of scrollback.
    pub async fn capture_pane(&self, name: &str, history_lines: usize) -> Result<String, TmuxError> {
        let mut argv = args(["capture-pane", "-t", name, "-p"]);
        if history_lines > 0 {
            argv.push("-S".to_string());
            argv.push(format!("-{}", history_lines));
        }
        Ok(self.tmux(argv).await?)
    }

    /// PID of the first pane's process in a session.
    pub async fn session_pid(&self, name: &str) -> Result<u32, TmuxError> {
        let stdout = self
            .tmux(args(["list-panes", "-t", name, "-F", "#{pane_pid}"]))
            .await?;
        stdout
            .lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
            .ok_or_else(|| TmuxError::NoPane(name.to_string()))
    }

    /// Process ids of every pane in every window of a session.
    pub async fn pane_pids(&self, name: &str) -> Result<Vec<u32>, TmuxError> {
        let stdout = self
            .tmux(args(["list-panes", "-s", "-t", name, "-F", "#{pane_pid}"]))
            .await?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect())
    }

    /// Foreground command of every pane in a session.
    pub async fn pane_current_commands(&self, name: &str) -> Result<Vec<String>, TmuxError> {
        let stdout = self
            .tmux(args(["list-panes", "-t", name, "-F", "#{pane_current_command}"]))
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Create a detached session, optionally in `start_dir` running `command`.
    pub async fn new_session(
        &self,
        name: &str,
        start_dir: Option<&str>,
        command: Option<&str>,
    ) -> Result<(), TmuxError> {
        validate_session_name(name)?;
        let mut argv = args(["new-session", "-d", "-s", name]);
        if let Some(dir) = start_dir.filter(|d| !d.is_empty()) {
            argv.push("-c".to_string());
            argv.push(dir.to_string());
        }
        if let Some(command) = command.filter(|c| !c.is_empty()) {
            argv.push(command.to_string());
        }
        self.tmux(argv).await?;
        Ok(())
    }

    pub async fn kill_session(&self, name: &str) -> Result<(), TmuxError> {
        validate_session_name(name)?;
        self.tmux(args(["kill-session", "-t", name])).await?;
        Ok(())
    }

    /// Type `keys` into the session followed by Enter.
    pub async fn send_keys(&self, name: &str, keys: &str) -> Result<(), TmuxError> {
        validate_session_name(name)?;
        self.tmux(args(["send-keys", "-t", name, keys, "Enter"]))
            .await?;
        Ok(())
    }

    /// Get the command to attach to a session (for external execution)
    pub fn attach_command(&self, name: &str) -> Vec<String> {
        vec![
            self.tmux_path.clone(),
            "attach-session".to_string(),
            "-t".to_string(),
            name.to_string(),
        ]
    }
}

/// Parse `tmux list-sessions -F SESSION_FORMAT` output.
///
/// Lines with fewer than six fields are dropped. Unparseable numbers become
/// zero (windows) or the Unix epoch (timestamps).
pub fn parse_sessions(output: &str) -> Vec<RawTmuxSession> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_session_line)
        .collect()
}

fn parse_session_line(line: &str) -> Option<RawTmuxSession> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < SESSION_FIELDS {
        return None;
    }

    Some(RawTmuxSession {
        name: parts[0].to_string(),
        created_at: parse_unix_timestamp(parts[1]),
        attached: parts[2] == "1",
        window_count: parts[3].trim().parse().unwrap_or(0),
        last_activity_at: parse_unix_timestamp(parts[4]),
        // a path containing the delimiter keeps its remaining pieces
        working_directory: parts[5..].join("|"),
    })
}

/// Seconds since the epoch; anything unparseable is the epoch itself.
pub fn parse_unix_timestamp(s: &str) -> DateTime<Utc> {
    s.trim()
        .parse::<i64>()
        .ok()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_default()
}
