pub mod rotate_keys;
pub mod server;

// Internal "interpreter" for `Action`; the match lives in `run` so this file stays small.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    RotateKeys(rotate_keys::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
