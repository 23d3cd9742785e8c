//! Fail-fast task group

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::CliError;

/// A set of tasks sharing one cancellation token
///
/// The first task to return an error cancels the group's token. Tasks that
/// return `Ok` leave their siblings running.
pub struct TaskGroup {
    token: CancellationToken,
    tasks: JoinSet<Result<(), CliError>>,
}

impl TaskGroup {
    /// Create a group whose token is a child of `parent`
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tasks: JoinSet::new(),
        }
    }

    /// The group's shared token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), CliError>> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.spawn(async move {
            let result = task.await;
            if let Err(e) = &result {
                debug!("Task failed, cancelling group: {}", e);
                token.cancel();
            }
            result
        });
    }

    /// Wait for every task and return the first error, if any
    pub async fn wait(mut self) -> Result<(), CliError> {
        let mut first_err = None;

        while let Some(joined) = self.tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    self.token.cancel();
                    Err(CliError::Internal(format!("task panicked: {}", e)))
                }
            };
            if let Err(e) = result {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
