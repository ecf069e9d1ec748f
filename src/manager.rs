//! Session operations used by the front end: list, create, kill, logs.

use crate::datasource::{CommandRunner, TmuxError};
use crate::detector::{DetectError, Detector};
use crate::models::Session;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Default number of scrollback lines returned by [`Manager::logs`].
pub const DEFAULT_LOG_LINES: usize = 1000;

/// Characters a shell would interpret inside the launched command
const UNSAFE_ARG_CHARS: [char; 13] = [
    '`', ';', '|', '&', '(', ')', '{', '}', '$', '<', '>', '\n', '\r',
];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot determine home directory")]
    NoHomeDir,
    #[error("cannot determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("argument contains unsafe character {0:?}")]
    UnsafeArgument(char),
    #[error("session {0} is a plain terminal process and is read-only")]
    ReadOnly(String),
    #[error(transparent)]
    Tmux(#[from] TmuxError),
}

/// Handles session CRUD operations
pub struct Manager<R> {
    detector: Detector<R>,
    log_lines: usize,
}

impl<R: CommandRunner> Manager<R> {
    pub fn new(detector: Detector<R>) -> Self {
        Self {
            detector,
            log_lines: DEFAULT_LOG_LINES,
        }
    }

    pub fn with_log_lines(mut self, lines: usize) -> Self {
        if lines > 0 {
            self.log_lines = lines;
        }
        self
    }

    pub fn detector(&self) -> &Detector<R> {
        &self.detector
    }

    /// All sessions visible right now.
    pub async fn list(&self) -> Result<Vec<Session>, DetectError> {
        self.detector.detect().await
    }

    /// Start the target program in a new detached tmux session.
    ///
    /// Returns the full session name (with prefix).
    pub async fn create(
        &self,
        name: &str,
        dir: Option<&str>,
        extra_args: &str,
    ) -> Result<String, SessionError> {
        let config = self.detector.config();
        let session_name = format!("{}{}", config.session_prefix, name);

        let start_dir = match dir.filter(|d| !d.trim().is_empty()) {
            Some(dir) => Some(existing_dir(dir)?),
            None => None,
        };
        validate_extra_args(extra_args)?;

        let extra_args = extra_args.trim();
        let command = if extra_args.is_empty() {
            config.target_program.clone()
        } else {
            format!("{} {}", config.target_program, extra_args)
        };

        let start_dir = start_dir.map(|p| p.to_string_lossy().into_owned());
        self.detector
            .tmux()
            .new_session(&session_name, start_dir.as_deref(), Some(&command))
            .await?;

        tracing::info!(session = %session_name, %command, "session created");
        Ok(session_name)
    }

    pub async fn kill(&self, session: &Session) -> Result<(), SessionError> {
        ensure_managed(session)?;
        self.detector.tmux().kill_session(&session.name).await?;
        tracing::info!(session = %session.name, "session killed");
        Ok(())
    }

    /// Recent pane output; `lines == 0` uses the configured default.
    pub async fn logs(&self, name: &str, lines: usize) -> Result<String, SessionError> {
        let lines = if lines == 0 { self.log_lines } else { lines };
        Ok(self.detector.tmux().capture_pane(name, lines).await?)
    }

    pub async fn send_command(&self, name: &str, command: &str) -> Result<(), SessionError> {
        Ok(self.detector.tmux().send_keys(name, command).await?)
    }

    /// Command line that attaches the current terminal to `session`.
    pub fn attach_command(&self, session: &Session) -> Result<Vec<String>, SessionError> {
        ensure_managed(session)?;
        Ok(self.detector.tmux().attach_command(&session.name))
    }
}

/// Attach and kill are only possible for tmux-backed sessions.
pub fn ensure_managed(session: &Session) -> Result<(), SessionError> {
    if session.managed {
        Ok(())
    } else {
        Err(SessionError::ReadOnly(session.name.clone()))
    }
}

/// Expand `~`, make relative paths absolute and drop `.` components.
pub fn resolve_path(path: &str) -> Result<PathBuf, SessionError> {
    let expanded = if path == "~" {
        dirs::home_dir().ok_or(SessionError::NoHomeDir)?
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().ok_or(SessionError::NoHomeDir)?.join(rest)
    } else {
        PathBuf::from(path)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map_err(SessionError::CurrentDir)?
            .join(expanded)
    };

    Ok(absolute
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}

fn existing_dir(path: &str) -> Result<PathBuf, SessionError> {
    let resolved = resolve_path(path)?;
    check_dir(&resolved)?;
    Ok(resolved)
}

fn check_dir(path: &Path) -> Result<(), SessionError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SessionError::NotADirectory(path.to_path_buf())),
        Err(_) => Err(SessionError::DirectoryNotFound(path.to_path_buf())),
    }
}

/// Reject extra arguments containing shell metacharacters.
pub fn validate_extra_args(args: &str) -> Result<(), SessionError> {
    match args.chars().find(|c| UNSAFE_ARG_CHARS.contains(c)) {
        Some(c) => Err(SessionError::UnsafeArgument(c)),
        None => Ok(()),
    }
}

/// Case-insensitive match on name, project, status or path.
pub fn filter_sessions(sessions: &[Session], query: &str) -> Vec<Session> {
    if query.is_empty() {
        return sessions.to_vec();
    }
    let query = query.to_lowercase();
    sessions
        .iter()
        .filter(|s| {
            [
                s.name.as_str(),
                s.project.as_str(),
                s.status.as_str(),
                s.working_directory.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
        })
        .cloned()
        .collect()
}

pub fn find_by_name<'a>(sessions: &'a [Session], name: &str) -> Option<&'a Session> {
    sessions.iter().find(|s| s.name == name)
}
