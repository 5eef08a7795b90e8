//! Command dispatch: bridges CLI args -> coordinator calls -> output formatting.

pub mod config_cmd;
pub mod discover;
pub mod run;
pub mod set;
pub mod status;
pub mod subscriptions;
pub mod token;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Session;
use crate::error::CliError;

/// Dispatch a profile-bound command to its handler.
pub async fn dispatch(cmd: Command, session: Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Status(args) => status::handle(&session, args, global).await,
        Command::Run(args) => run::handle(session, args, global).await,
        Command::Set(args) => set::handle(&session, args, global).await,
        Command::Discover(args) => discover::handle(session, args, global).await,
        Command::Subscriptions(args) => subscriptions::handle(session, args, global).await,
        Command::Token(args) => token::handle(&session, args, global).await,
        // Config and Completions are handled before a profile is opened
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "handled without a profile".into(),
        }),
    }
}
