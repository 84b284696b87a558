use dcdeploy_engine::{Prompter, PromptError};
use dialoguer::Confirm;

/// Asks on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(|error| PromptError::Terminal {
                message: error.to_string(),
            })
    }
}
