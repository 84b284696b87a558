#![allow(clippy::expect_used)]

use dcdeploy_domain::{GraphqlError, WarningLevel};

use super::{Decision, decide, enforce};
use crate::error::PolicyError;
use crate::fake::ScriptedPrompter;
use crate::options::DeployFlags;

fn flags(force: bool, non_interactive: bool, dry_run: bool) -> DeployFlags {
    DeployFlags {
        force,
        dry_run,
        non_interactive,
    }
}

fn all_flag_combinations() -> Vec<DeployFlags> {
    let mut combinations = Vec::new();
    for force in [false, true] {
        for non_interactive in [false, true] {
            for dry_run in [false, true] {
                combinations.push(flags(force, non_interactive, dry_run));
            }
        }
    }
    combinations
}

fn batch(level: WarningLevel) -> Vec<GraphqlError> {
    vec![GraphqlError::new("change").with_level(level)]
}

fn proceeds(errors: &[GraphqlError], flags: DeployFlags, answer: bool) -> (bool, usize) {
    let prompter = ScriptedPrompter::new(&[answer]);
    let decision = decide(errors, flags, &prompter).expect("decide");
    (decision == Decision::Proceed, prompter.asked().len())
}

#[test]
fn hard_errors_abort_under_every_flag_combination() {
    let errors = vec![GraphqlError::new("syntax error")];
    for flags in all_flag_combinations() {
        assert_eq!(proceeds(&errors, flags, true), (false, 0), "{flags:?}");
    }
}

#[test]
fn log_only_never_blocks() {
    for flags in all_flag_combinations() {
        assert_eq!(
            proceeds(&batch(WarningLevel::LogOnly), flags, false),
            (true, 0),
            "{flags:?}"
        );
    }
}

#[test]
fn interactive_ack_prompts_only_without_waivers() {
    for flags in all_flag_combinations() {
        let waived = flags.force || flags.dry_run || flags.non_interactive;
        let errors = batch(WarningLevel::InteractiveAck);
        if waived {
            assert_eq!(proceeds(&errors, flags, false), (true, 0), "{flags:?}");
        } else {
            assert_eq!(proceeds(&errors, flags, true), (true, 1));
            assert_eq!(proceeds(&errors, flags, false), (false, 1));
        }
    }
}

#[test]
fn require_ack_table() {
    let errors = batch(WarningLevel::RequireAck);
    for flags in all_flag_combinations() {
        if flags.force {
            assert_eq!(proceeds(&errors, flags, false), (true, 0), "{flags:?}");
        } else if flags.non_interactive {
            assert_eq!(proceeds(&errors, flags, true), (false, 0), "{flags:?}");
        } else {
            assert_eq!(proceeds(&errors, flags, true), (true, 1), "{flags:?}");
            assert_eq!(proceeds(&errors, flags, false), (false, 1), "{flags:?}");
        }
    }
}

#[test]
fn require_force_is_never_prompted() {
    let errors = batch(WarningLevel::RequireForce);
    for flags in all_flag_combinations() {
        let expected = (flags.force, 0);
        assert_eq!(proceeds(&errors, flags, true), expected, "{flags:?}");
    }
}

#[test]
fn require_force_abort_precedes_acknowledgement_prompts() {
    let mut errors = batch(WarningLevel::RequireForce);
    errors.extend(batch(WarningLevel::RequireAck));
    assert_eq!(proceeds(&errors, DeployFlags::default(), true), (false, 0));
}

#[test]
fn enforce_carries_the_full_batch_on_abort() {
    let mut errors = batch(WarningLevel::RequireAck);
    errors.extend(batch(WarningLevel::LogOnly));
    let prompter = ScriptedPrompter::new(&[]);
    let error = enforce(&errors, flags(false, true, false), &prompter).expect_err("abort");
    assert!(
        matches!(error, PolicyError::Aborted { errors: ref carried, .. } if carried.len() == 2),
        "unexpected error: {error}"
    );
}
