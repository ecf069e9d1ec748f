pub mod cwd;
pub mod process;
pub mod runner;
pub mod tmux;

pub use cwd::CwdCache;
pub use process::{ChildIndex, ProcessRecord, ProcessSnapshot, ResourceUsage};
pub use runner::{CommandError, CommandOutput, CommandRunner, SystemCommandRunner};
pub use tmux::{TmuxClient, TmuxError};
