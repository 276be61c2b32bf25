//! Subcommands pertaining to integration session management.

mod start;
pub use start::StartCmd;

mod close;
pub use close::CloseCmd;

mod list;
pub use list::SessionsCmd;
