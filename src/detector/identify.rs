use super::status::{StatusClassifier, TAIL_LINES};
use super::DetectionReason;
use crate::datasource::{
    ChildIndex, CommandError, CommandRunner, CwdCache, ProcessSnapshot, ResourceUsage, TmuxClient,
    TmuxError,
};
use crate::models::{extract_project, last_path_component, RawTmuxSession, Session, SessionStatus};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// Both discovery sources failed, nothing can be reported
    #[error("cannot list tmux sessions ({tmux}) or read the process table ({ps})")]
    NoSources { tmux: TmuxError, ps: CommandError },
}

/// Detection settings
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Executable name of the program to look for
    pub target_program: String,
    /// Prefix of sessions created by this tool
    pub session_prefix: String,
    pub active_window: Duration,
    pub cwd_cache_ttl: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            target_program: "claude".to_string(),
            session_prefix: "cd-".to_string(),
            active_window: super::status::DEFAULT_ACTIVE_WINDOW,
            cwd_cache_ttl: crate::datasource::cwd::DEFAULT_CWD_TTL,
        }
    }
}

/// Claude Code session detector
///
/// One [`Detector::detect`] call is one poll tick. The only state kept
/// between ticks is the working-directory cache.
pub struct Detector<R> {
    tmux: TmuxClient<R>,
    cwd_cache: CwdCache,
    classifier: StatusClassifier,
    config: DetectorConfig,
}

impl<R: CommandRunner> Detector<R> {
    pub fn new(runner: R, config: DetectorConfig) -> Self {
        Self {
            tmux: TmuxClient::new(runner),
            cwd_cache: CwdCache::new(config.cwd_cache_ttl),
            classifier: StatusClassifier::new(config.active_window),
            config,
        }
    }

    /// Replace the status classifier (e.g. with extra line rules)
    pub fn with_classifier(mut self, classifier: StatusClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn tmux(&self) -> &TmuxClient<R> {
        &self.tmux
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run a full discovery pass.
    pub async fn detect(&self) -> Result<Vec<Session>, DetectError> {
        self.detect_at(Utc::now()).await
    }

    /// Discovery pass with an explicit poll time.
    pub async fn detect_at(&self, now: DateTime<Utc>) -> Result<Vec<Session>, DetectError> {
        // Independent sources; both must finish before anything is merged
        let (listing, snapshot) = tokio::join!(
            self.tmux.list_sessions(),
            ProcessSnapshot::capture(self.tmux.runner())
        );

        let (raw_sessions, snapshot) = match (listing, snapshot) {
            (Err(tmux), Err(ps)) => return Err(DetectError::NoSources { tmux, ps }),
            (listing, snapshot) => {
                let raw_sessions = listing.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "tmux listing failed, terminal sessions only");
                    Vec::new()
                });
                let snapshot = snapshot.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "process table unavailable");
                    ProcessSnapshot::default()
                });
                (raw_sessions, snapshot)
            }
        };

        let index = snapshot.child_index();
        let mut sessions = Vec::with_capacity(raw_sessions.len());
        let mut pane_roots = Vec::new();

        for raw in raw_sessions {
            if let Some((session, panes)) = self.managed_session(raw, &snapshot, &index, now).await
            {
                sessions.push(session);
                pane_roots.extend(panes);
            }
        }

        // Claim tmux-owned processes before scanning terminals, so a process
        // is never reported twice
        let claimed = claimed_pids(&pane_roots, &index);
        let terminal = self.terminal_sessions(&snapshot, &index, &claimed).await;

        tracing::debug!(
            managed = sessions.len(),
            terminal = terminal.len(),
            processes = snapshot.len(),
            "detection pass finished"
        );

        sessions.extend(terminal);
        self.cwd_cache.prune();
        Ok(sessions)
    }

    async fn managed_session(
        &self,
        raw: RawTmuxSession,
        snapshot: &ProcessSnapshot,
        index: &ChildIndex<'_>,
        now: DateTime<Utc>,
    ) -> Option<(Session, Vec<u32>)> {
        let pane_pid = match self.tmux.session_pid(&raw.name).await {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::debug!(session = %raw.name, error = %e, "pane pid lookup failed");
                None
            }
        };
        let panes = self.all_pane_pids(&raw.name, pane_pid).await;

        let reason = self.qualify(&raw.name, &panes, index).await?;
        tracing::debug!(session = %raw.name, reason = %reason.display(), "tmux session matched");

        let status = self.session_status(&raw, now).await;
        let usage = panes.iter().fold(ResourceUsage::default(), |mut total, &pid| {
            let pane = index.subtree_usage(snapshot, pid);
            total.cpu_percent += pane.cpu_percent;
            total.mem_percent += pane.mem_percent;
            total
        });

        let session = Session {
            project: extract_project(
                &raw.name,
                &raw.working_directory,
                &self.config.session_prefix,
            ),
            status,
            started_at: known_time(raw.created_at),
            last_activity_at: known_time(raw.last_activity_at),
            attached: raw.attached,
            process_id: pane_pid,
            cpu_percent: usage.cpu_percent,
            mem_percent: usage.mem_percent,
            working_directory: raw.working_directory,
            managed: true,
            name: raw.name,
        };
        Some((session, panes))
    }

    /// Pids of every pane in the session, always including `first`.
    async fn all_pane_pids(&self, name: &str, first: Option<u32>) -> Vec<u32> {
        let mut panes = match self.tmux.pane_pids(name).await {
            Ok(pids) => pids,
            Err(e) => {
                tracing::debug!(session = name, error = %e, "pane list lookup failed");
                Vec::new()
            }
        };
        if let Some(first) = first {
            if !panes.contains(&first) {
                panes.insert(0, first);
            }
        }
        panes
    }

    /// Decide whether a tmux session belongs to the target program.
    ///
    /// Cheap name checks first, then the panes' foreground commands, then the
    /// pane's whole process subtree.
    async fn qualify(
        &self,
        name: &str,
        panes: &[u32],
        index: &ChildIndex<'_>,
    ) -> Option<DetectionReason> {
        let target = self.config.target_program.to_lowercase();
        let prefix = &self.config.session_prefix;

        if !prefix.is_empty() && name.starts_with(prefix.as_str()) {
            return Some(DetectionReason::ManagedPrefix);
        }
        if name.to_lowercase().contains(&target) {
            return Some(DetectionReason::NameKeyword);
        }

        match self.tmux.pane_current_commands(name).await {
            Ok(commands) => {
                if let Some(command) = commands
                    .into_iter()
                    .find(|c| c.to_lowercase().contains(&target))
                {
                    return Some(DetectionReason::PaneCommand { command });
                }
            }
            Err(e) => tracing::debug!(session = name, error = %e, "list-panes failed"),
        }

        panes
            .iter()
            .copied()
            .find(|&pid| index.has_descendant_matching(pid, &target))
            .map(|pane_pid| DetectionReason::Descendant { pane_pid })
    }

    async fn session_status(&self, raw: &RawTmuxSession, now: DateTime<Utc>) -> SessionStatus {
        if self.classifier.is_fresh(raw.last_activity_at, now) {
            return SessionStatus::Active;
        }

        let pane = match self.tmux.capture_pane(&raw.name, TAIL_LINES).await {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::debug!(session = %raw.name, error = %e, "capture-pane failed");
                None
            }
        };
        self.classifier
            .classify(raw.last_activity_at, now, pane.as_deref())
    }

    /// Target processes on a real terminal that no tmux session owns.
    async fn terminal_sessions(
        &self,
        snapshot: &ProcessSnapshot,
        index: &ChildIndex<'_>,
        claimed: &HashSet<u32>,
    ) -> Vec<Session> {
        let mut candidates: Vec<_> = snapshot
            .iter()
            .filter(|p| p.executable_name() == self.config.target_program)
            .filter(|p| !claimed.contains(&p.pid))
            .filter_map(|p| p.tty.as_ref().map(|tty| (p, tty)))
            .collect();
        candidates.sort_by_key(|(p, _)| p.pid);

        let mut sessions = Vec::with_capacity(candidates.len());
        for (proc, tty) in candidates {
            let path = self.cwd_cache.resolve(self.tmux.runner(), proc.pid).await;
            let usage = index.subtree_usage(snapshot, proc.pid);

            sessions.push(Session {
                name: format!("terminal/{}", tty),
                project: last_path_component(&path).unwrap_or_default(),
                status: SessionStatus::Terminal,
                started_at: None,
                last_activity_at: None,
                attached: false,
                process_id: Some(proc.pid),
                cpu_percent: usage.cpu_percent,
                mem_percent: usage.mem_percent,
                working_directory: path,
                managed: false,
            });
        }
        sessions
    }
}

/// Pane pids of managed sessions plus every process below them.
fn claimed_pids(pane_roots: &[u32], index: &ChildIndex<'_>) -> HashSet<u32> {
    pane_roots
        .iter()
        .copied()
        .flat_map(|pid| std::iter::once(pid).chain(index.descendants(pid)))
        .collect()
}

/// tmux reports 0 for unknown timestamps
fn known_time(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (t.timestamp() != 0).then_some(t)
}
