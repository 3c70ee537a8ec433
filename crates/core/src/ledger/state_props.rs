//! Property-based tests for the transfer state machine.

use proptest::prelude::*;

use super::error::LedgerError;
use super::state::TransferStatus;

fn status_strategy() -> impl Strategy<Value = TransferStatus> {
    prop_oneof![
        Just(TransferStatus::Pending),
        Just(TransferStatus::Completed),
        Just(TransferStatus::Reversed),
        Just(TransferStatus::Failed),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Final states never move, whatever the target.
    #[test]
    fn prop_final_states_reject_everything(
        from in status_strategy(),
        to in status_strategy(),
    ) {
        prop_assume!(from.is_final());
        let result = from.transition(to);
        let is_invalid_transition =
            matches!(result, Err(LedgerError::InvalidStateTransition { .. }));
        prop_assert!(is_invalid_transition);
    }

    /// `transition` succeeds exactly when `can_transition_to` says so.
    #[test]
    fn prop_transition_matches_predicate(
        from in status_strategy(),
        to in status_strategy(),
    ) {
        prop_assert_eq!(from.transition(to).is_ok(), from.can_transition_to(to));
    }

    /// Reversed is reachable only from Completed.
    #[test]
    fn prop_reversed_only_from_completed(from in status_strategy()) {
        let ok = from.transition(TransferStatus::Reversed).is_ok();
        prop_assert_eq!(ok, from == TransferStatus::Completed);
    }

    /// No status ever transitions to itself.
    #[test]
    fn prop_no_self_loops(status in status_strategy()) {
        prop_assert!(status.transition(status).is_err());
    }
}
