//! Command implementations.

mod extract;
mod status;
mod watch;

pub use extract::cmd_extract;
pub use status::cmd_status;
pub use watch::cmd_run;
