pub mod session;

pub use session::{extract_project, last_path_component, RawTmuxSession, Session, SessionStatus};
