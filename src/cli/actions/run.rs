use crate::cli::actions::{Action, rotate_keys, server};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point: every `Action::*` variant maps to one `*::execute`.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::RotateKeys(args) => rotate_keys::execute(args).await,
    }
}
