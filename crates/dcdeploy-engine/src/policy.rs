use dcdeploy_domain::{GraphqlError, WarningLevel};

use crate::error::{PolicyError, PromptError};
use crate::options::DeployFlags;
use crate::prompt::Prompter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Abort { reason: String },
}

fn at_level(errors: &[GraphqlError], level: WarningLevel) -> Vec<&GraphqlError> {
    errors
        .iter()
        .filter(|error| error.warning_level() == Some(level))
        .collect()
}

fn describe(errors: &[&GraphqlError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decide whether a batch of classified errors lets the deploy continue.
///
/// Hard errors always abort. `REQUIRE_FORCE` needs `--force` and is never
/// prompted. `REQUIRE_ACK` proceeds with `--force`, aborts when
/// non-interactive, and otherwise asks. `INTERACTIVE_ACK` only asks when
/// none of `--force`, `--dry-run` or `--non-interactive` is set.
///
/// # Errors
///
/// Returns an error when a prompt cannot be answered.
pub fn decide(
    errors: &[GraphqlError],
    flags: DeployFlags,
    prompter: &dyn Prompter,
) -> Result<Decision, PromptError> {
    if errors.iter().any(GraphqlError::is_hard_error) {
        return Ok(Decision::Abort {
            reason: "There are errors in your schema and connector files.".to_string(),
        });
    }

    let require_force = at_level(errors, WarningLevel::RequireForce);
    if !require_force.is_empty() && !flags.force {
        tracing::error!(
            "There are changes in your schema or connectors that will result in broken behavior:\n{}",
            describe(&require_force)
        );
        return Ok(Decision::Abort {
            reason: "Rerun this command with --force to deploy these changes.".to_string(),
        });
    }

    let require_ack = at_level(errors, WarningLevel::RequireAck);
    if !require_ack.is_empty() {
        tracing::warn!(
            "There are changes in your schema or connectors that may break your existing applications or introduce insecure operations:\n{}",
            describe(&require_ack)
        );
        if !flags.force {
            if flags.non_interactive {
                return Ok(Decision::Abort {
                    reason: "Explicit acknowledgement required for breaking schema or connector changes and new insecure operations. Rerun this deploy with --force to deploy these changes.".to_string(),
                });
            }
            if !prompter.confirm("Would you like to proceed with these breaking changes?", false)? {
                return Ok(Decision::Abort {
                    reason: "Deployment aborted.".to_string(),
                });
            }
        }
    }

    let interactive_ack = at_level(errors, WarningLevel::InteractiveAck);
    if !interactive_ack.is_empty() {
        tracing::warn!(
            "There are existing queries or mutations that may be affected by the changes:\n{}",
            describe(&interactive_ack)
        );
        let waived = flags.force || flags.dry_run || flags.non_interactive;
        if !waived && !prompter.confirm("Would you like to proceed with these changes?", true)? {
            return Ok(Decision::Abort {
                reason: "Deployment aborted.".to_string(),
            });
        }
    }

    for error in at_level(errors, WarningLevel::LogOnly) {
        tracing::info!("{error}");
    }

    Ok(Decision::Proceed)
}

/// [`decide`], turning an abort into an error that carries the whole batch.
///
/// # Errors
///
/// Returns [`PolicyError::Aborted`] when the batch may not proceed.
pub fn enforce(
    errors: &[GraphqlError],
    flags: DeployFlags,
    prompter: &dyn Prompter,
) -> Result<(), PolicyError> {
    match decide(errors, flags, prompter)? {
        Decision::Proceed => Ok(()),
        Decision::Abort { reason } => Err(PolicyError::Aborted {
            reason,
            errors: errors.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests;
