pub mod identify;
pub mod status;

pub use identify::{DetectError, Detector, DetectorConfig};
pub use status::{LineRule, StatusClassifier};

/// Why a tmux session was recognized as a Claude Code session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionReason {
    /// Name carries the managed-session prefix
    ManagedPrefix,
    /// Name mentions the target program
    NameKeyword,
    /// A pane's foreground command is the target program
    PaneCommand { command: String },
    /// The target program runs somewhere below the pane process
    Descendant { pane_pid: u32 },
}

impl DetectionReason {
    /// Short description for logs
    pub fn display(&self) -> String {
        match self {
            DetectionReason::ManagedPrefix => "managed prefix".to_string(),
            DetectionReason::NameKeyword => "name keyword".to_string(),
            DetectionReason::PaneCommand { command } => {
                format!("pane command ({})", Self::basename(command))
            }
            DetectionReason::Descendant { pane_pid } => {
                format!("descendant of pane pid {}", pane_pid)
            }
        }
    }

    /// basename of a command (first word only)
    fn basename(command: &str) -> &str {
        let first_part = command.split_whitespace().next().unwrap_or(command);
        first_part.rsplit('/').next().unwrap_or(first_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DetectionReason::ManagedPrefix.display(), "managed prefix");
        assert_eq!(
            DetectionReason::PaneCommand {
                command: "/usr/local/bin/claude --resume".to_string()
            }
            .display(),
            "pane command (claude)"
        );
        assert_eq!(
            DetectionReason::Descendant { pane_pid: 77 }.display(),
            "descendant of pane pid 77"
        );
    }
}
