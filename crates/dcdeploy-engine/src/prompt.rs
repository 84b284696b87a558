use crate::error::PromptError;
use crate::options::DeployFlags;

/// Operator confirmation capability.
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns an error when the answer cannot be read.
    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError>;
}

/// Answers every question with its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        tracing::debug!(message, default, "non-interactive confirmation");
        Ok(default)
    }
}

/// `--force` answers yes, `--non-interactive` takes the default, otherwise the operator decides.
///
/// # Errors
///
/// Returns an error when the prompter fails to read an answer.
pub fn confirm(
    prompter: &dyn Prompter,
    flags: DeployFlags,
    message: &str,
    default: bool,
) -> Result<bool, PromptError> {
    if flags.force {
        return Ok(true);
    }
    if flags.non_interactive {
        return Ok(default);
    }
    prompter.confirm(message, default)
}
