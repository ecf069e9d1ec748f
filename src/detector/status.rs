//! Activity status from tmux activity timestamps and pane text.

use crate::models::SessionStatus;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Activity newer than this counts as streaming output.
pub const DEFAULT_ACTIVE_WINDOW: Duration = Duration::from_secs(2);

/// Number of trailing pane lines inspected.
pub const TAIL_LINES: usize = 20;

/// Outcome whenever the pane text gives no usable signal, including when it
/// cannot be captured at all. Never `Active`: a dead pane must not look busy.
pub const FALLBACK_STATUS: SessionStatus = SessionStatus::Idle;

const CONFIRM_PATTERNS: [&str; 8] = [
    "(y/n)", "(Y/n)", "(y/N)", "[y/n]", "[Y/n]", "[y/N]", "Y/n", "y/N",
];

const PROMPT_GLYPHS: [char; 2] = ['❯', '›'];

/// A single line heuristic: if `matches` holds for a pane line, the session
/// has `status`.
#[derive(Clone, Copy)]
pub struct LineRule {
    pub name: &'static str,
    pub status: SessionStatus,
    pub matches: fn(&str) -> bool,
}

impl std::fmt::Debug for LineRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineRule")
            .field("name", &self.name)
            .field("status", &self.status)
            .finish()
    }
}

fn ends_with_question(line: &str) -> bool {
    line.ends_with('?')
}

fn has_confirm_pattern(line: &str) -> bool {
    CONFIRM_PATTERNS.iter().any(|p| line.contains(p))
}

fn is_shell_prompt(line: &str) -> bool {
    line.starts_with('>') || line.contains(PROMPT_GLYPHS) || line.ends_with('$')
}

/// Built-in rules, checked in order against each line.
pub fn default_rules() -> Vec<LineRule> {
    vec![
        LineRule {
            name: "question",
            status: SessionStatus::Waiting,
            matches: ends_with_question,
        },
        LineRule {
            name: "confirmation",
            status: SessionStatus::Waiting,
            matches: has_confirm_pattern,
        },
        LineRule {
            name: "prompt",
            status: SessionStatus::Idle,
            matches: is_shell_prompt,
        },
    ]
}

/// Classifies tmux sessions as Active, Waiting or Idle
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    active_window: Duration,
    rules: Vec<LineRule>,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVE_WINDOW)
    }
}

impl StatusClassifier {
    pub fn new(active_window: Duration) -> Self {
        Self {
            active_window,
            rules: default_rules(),
        }
    }

    /// Append a rule; it runs after the existing ones.
    pub fn with_rule(mut self, rule: LineRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[LineRule] {
        &self.rules
    }

    /// Whether tmux saw activity within the active window.
    ///
    /// Timestamps slightly in the future (clock skew) count as fresh.
    pub fn is_fresh(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if last_activity.timestamp() == 0 {
            return false;
        }
        match (now - last_activity).to_std() {
            Ok(elapsed) => elapsed < self.active_window,
            Err(_) => true,
        }
    }

    /// Full classification. `pane` is `None` when capture failed.
    pub fn classify(
        &self,
        last_activity: DateTime<Utc>,
        now: DateTime<Utc>,
        pane: Option<&str>,
    ) -> SessionStatus {
        if self.is_fresh(last_activity, now) {
            return SessionStatus::Active;
        }
        pane.map(|content| self.classify_text(content))
            .unwrap_or(FALLBACK_STATUS)
    }

    /// Scan the last non-blank lines, newest first; the first line any rule
    /// matches decides.
    pub fn classify_text(&self, content: &str) -> SessionStatus {
        content
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(TAIL_LINES)
            .find_map(|line| self.match_line(line))
            .unwrap_or(FALLBACK_STATUS)
    }

    fn match_line(&self, line: &str) -> Option<SessionStatus> {
        self.rules.iter().find(|rule| (rule.matches)(line)).map(|rule| {
            tracing::trace!(rule = rule.name, line, "status rule matched");
            rule.status
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    fn ago(secs: i64) -> DateTime<Utc> {
        now() - ChronoDuration::seconds(secs)
    }

    #[test]
    fn test_recent_activity_is_active() {
        let c = StatusClassifier::default();
        assert_eq!(c.classify(ago(1), now(), None), SessionStatus::Active);
        assert_eq!(c.classify(ago(1), now(), Some("Continue? (y/n)")), SessionStatus::Active);
    }

    #[test]
    fn test_stale_confirmation_is_waiting() {
        let c = StatusClassifier::default();
        assert_eq!(
            c.classify(ago(600), now(), Some("Continue? (y/n)")),
            SessionStatus::Waiting
        );
    }

    #[test]
    fn test_stale_shell_prompt_is_idle() {
        let c = StatusClassifier::default();
        assert_eq!(
            c.classify(ago(600), now(), Some("user@host:~/project$")),
            SessionStatus::Idle
        );
    }

    #[test]
    fn test_capture_failure_is_idle() {
        let c = StatusClassifier::default();
        assert_eq!(c.classify(ago(600), now(), None), SessionStatus::Idle);
    }

    #[test]
    fn test_epoch_activity_is_never_fresh() {
        let c = StatusClassifier::default();
        assert!(!c.is_fresh(DateTime::<Utc>::default(), now()));
    }

    #[test]
    fn test_future_activity_counts_as_fresh() {
        let c = StatusClassifier::default();
        assert!(c.is_fresh(now() + ChronoDuration::seconds(1), now()));
    }

    #[test]
    fn test_active_window_boundary() {
        let c = StatusClassifier::new(Duration::from_secs(2));
        assert!(c.is_fresh(ago(1), now()));
        assert!(!c.is_fresh(ago(2), now()));
    }

    #[test]
    fn test_question_must_end_line() {
        let c = StatusClassifier::default();
        assert_eq!(c.classify_text("Do you want to proceed?"), SessionStatus::Waiting);
        // "?" inside text is not a question, the older prompt line decides
        assert_eq!(c.classify_text("$\nmatched ?foo in query"), SessionStatus::Idle);
        assert_eq!(c.classify_text("matched ?foo in query"), FALLBACK_STATUS);
    }

    #[test]
    fn test_confirm_patterns() {
        let c = StatusClassifier::default();
        for line in ["Overwrite (Y/n)", "Delete all (y/N) ", "apply [y/n]:"] {
            assert_eq!(c.classify_text(line), SessionStatus::Waiting, "{line}");
        }
    }

    #[test]
    fn test_dollar_must_end_line() {
        let c = StatusClassifier::default();
        // an embedded variable is not a prompt, so the older question still decides
        let content = "Proceed? (y/n)\necho $HOME done";
        assert_eq!(c.classify_text(content), SessionStatus::Waiting);

        let content = "Proceed? (y/n)\n~/src $";
        assert_eq!(c.classify_text(content), SessionStatus::Idle);
    }

    #[test]
    fn test_newest_line_decides() {
        let c = StatusClassifier::default();
        // question answered, prompt is back
        let content = "Run tests? (y/n)\ny\nall passed\n> \n\n";
        assert_eq!(c.classify_text(content), SessionStatus::Idle);

        let content = "> fix the bug\nworking...\nApply this edit?\n\n";
        assert_eq!(c.classify_text(content), SessionStatus::Waiting);
    }

    #[test]
    fn test_prompt_glyph() {
        let c = StatusClassifier::default();
        assert_eq!(c.classify_text("output\n❯ "), SessionStatus::Idle);
    }

    #[test]
    fn test_only_tail_is_inspected() {
        let c = StatusClassifier::default();
        let mut content = String::from("Proceed?\n");
        for i in 0..TAIL_LINES {
            content.push_str(&format!("log line {}\n", i));
        }
        assert_eq!(c.classify_text(&content), SessionStatus::Idle);
    }

    #[test]
    fn test_blank_padding_does_not_count_toward_tail() {
        let c = StatusClassifier::default();
        // capture-pane pads to the pane height with empty rows
        let content = format!("Continue? (y/n){}", "\n".repeat(30));
        assert_eq!(c.classify_text(&content), SessionStatus::Waiting);

        let content = format!("Proceed?\n{}", "   \n".repeat(TAIL_LINES * 2));
        assert_eq!(c.classify_text(&content), SessionStatus::Waiting);
    }

    #[test]
    fn test_empty_content_falls_back() {
        let c = StatusClassifier::default();
        assert_eq!(c.classify_text(""), FALLBACK_STATUS);
        assert_eq!(c.classify_text("\n  \n\n"), FALLBACK_STATUS);
    }

    #[test]
    fn test_custom_rule_runs_after_builtins() {
        fn spinner(line: &str) -> bool {
            line.contains("esc to interrupt")
        }
        let c = StatusClassifier::default().with_rule(LineRule {
            name: "spinner",
            status: SessionStatus::Active,
            matches: spinner,
        });
        assert_eq!(c.rules().len(), 4);
        assert_eq!(c.classify_text("✻ Thinking… (esc to interrupt)"), SessionStatus::Active);
        assert_eq!(c.classify_text("esc to interrupt?"), SessionStatus::Waiting);
    }
}
