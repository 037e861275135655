//! Role and time-lock evaluation.
//!
//! Pure functions over a [`ContractRoleSnapshot`]. Callers are expected to
//! pass a freshly read snapshot; nothing here caches.

use alloy_primitives::Address;

use crate::operations::CoreOperation;
use crate::registry::{OperationDefinition, OperationId};
use crate::types::{ContractRoleSnapshot, Phase, Role};

/// Whether `connected` may perform `phase` of `operation`.
///
/// True when the address holds any role the phase requires. Addresses are
/// compared as 20-byte values, so hex casing in the input never matters.
/// Cancelling an ownership transfer is additionally open to the recovery
/// address, which is the emergency abort path for that operation.
pub fn can_execute_phase(
    operation: &OperationDefinition,
    phase: Phase,
    connected: Address,
    snapshot: &ContractRoleSnapshot,
) -> bool {
    let Some(required) = operation.required_roles(phase) else {
        return false;
    };
    if required
        .roles()
        .iter()
        .any(|role| role.holder(snapshot) == connected)
    {
        return true;
    }

    operation.id == OperationId::Core(CoreOperation::TransferOwnership)
        && phase.is_cancellation()
        && Role::Recovery.holder(snapshot) == connected
}

/// Percentage of the time lock that has elapsed, clamped to `[0, 100]`.
///
/// The lock started at `release_time - lock_duration`. With a zero
/// duration the lock is either fully elapsed (`now >= release_time`) or
/// not started at all.
pub fn time_lock_progress(release_time: u64, lock_duration: u64, now: u64) -> f64 {
    if lock_duration == 0 {
        return if now >= release_time { 100.0 } else { 0.0 };
    }
    if now >= release_time {
        return 100.0;
    }
    let start = release_time.saturating_sub(lock_duration);
    if now <= start {
        return 0.0;
    }
    let elapsed = (now - start) as f64;
    ((elapsed / lock_duration as f64) * 100.0).clamp(0.0, 100.0)
}

pub fn is_time_lock_complete(release_time: u64, lock_duration: u64, now: u64) -> bool {
    time_lock_progress(release_time, lock_duration, now) >= 100.0
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000;

    fn snapshot() -> ContractRoleSnapshot {
        ContractRoleSnapshot {
            contract: Address::repeat_byte(0xcc),
            owner: Address::repeat_byte(0x01),
            broadcaster: Address::repeat_byte(0x02),
            recovery: Address::repeat_byte(0x03),
            time_lock_period: 86_400,
            chain_id: 31_337,
        }
    }

    fn holder_strategy() -> impl Strategy<Value = u8> {
        // 1..=3 hold roles, 4 holds nothing
        1u8..=4
    }

    fn phase_strategy() -> impl Strategy<Value = Phase> {
        prop_oneof![
            Just(Phase::Request),
            Just(Phase::Approve),
            Just(Phase::Cancel),
            Just(Phase::MetaApprove),
            Just(Phase::MetaCancel),
            Just(Phase::RequestAndApprove),
            Just(Phase::Broadcast),
        ]
    }

    #[test]
    fn hex_case_is_irrelevant() {
        let lower = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd";
        let mut snap = snapshot();
        snap.owner = lower.parse().unwrap();
        let def = CoreOperation::MintTokens.definition();
        let upper: Address = "0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD".parse().unwrap();
        assert!(can_execute_phase(&def, Phase::RequestAndApprove, upper, &snap));
    }

    #[test]
    fn recovery_may_cancel_ownership_transfer() {
        let snap = snapshot();
        let def = CoreOperation::TransferOwnership.definition();
        assert!(!def.required_roles(Phase::Cancel).unwrap().permits(Role::Recovery));
        assert!(can_execute_phase(&def, Phase::Cancel, snap.recovery, &snap));
        assert!(can_execute_phase(&def, Phase::MetaCancel, snap.recovery, &snap));
        assert!(!can_execute_phase(&def, Phase::MetaApprove, snap.recovery, &snap));
    }

    #[test]
    fn recovery_cannot_cancel_other_operations() {
        let snap = snapshot();
        let def = CoreOperation::UpdateBroadcaster.definition();
        assert!(!can_execute_phase(&def, Phase::Cancel, snap.recovery, &snap));
        assert!(can_execute_phase(&def, Phase::Cancel, snap.owner, &snap));
    }

    #[test]
    fn phases_outside_the_shape_are_never_allowed() {
        let snap = snapshot();
        let mint = CoreOperation::MintTokens.definition();
        assert!(!can_execute_phase(&mint, Phase::Approve, snap.owner, &snap));
    }

    #[test]
    fn ownership_transfer_scenario() {
        let snap = snapshot();
        let release = NOW + 86_400;
        assert_eq!(time_lock_progress(release, 86_400, NOW), 0.0);
        assert_eq!(time_lock_progress(release, 86_400, NOW + 86_400), 100.0);
        assert!(is_time_lock_complete(release, 86_400, NOW + 86_400));

        let def = CoreOperation::TransferOwnership.definition();
        assert!(can_execute_phase(&def, Phase::Approve, snap.owner, &snap));
    }

    #[test]
    fn progress_midway_and_zero_duration() {
        assert_eq!(time_lock_progress(NOW + 50, 100, NOW), 50.0);
        assert_eq!(time_lock_progress(NOW, 0, NOW - 1), 0.0);
        assert_eq!(time_lock_progress(NOW, 0, NOW), 100.0);
        // release earlier than the lock duration since epoch
        assert_eq!(time_lock_progress(10, 100, 10), 100.0);
    }

    proptest! {
        #[test]
        fn evaluator_matches_role_table(
            op_index in 0usize..CoreOperation::ALL.len(),
            phase in phase_strategy(),
            holder in holder_strategy(),
        ) {
            let snap = snapshot();
            let def = CoreOperation::ALL[op_index].definition();
            let connected = Address::repeat_byte(holder);

            let held = snap.roles_of(connected);
            let listed = def
                .required_roles(phase)
                .map(|r| held.iter().any(|role| r.permits(*role)))
                .unwrap_or(false);
            let special = def.id == OperationId::Core(CoreOperation::TransferOwnership)
                && phase.is_cancellation()
                && connected == snap.recovery;

            prop_assert_eq!(
                can_execute_phase(&def, phase, connected, &snap),
                listed || special
            );
        }

        #[test]
        fn progress_is_monotonic_and_clamped(
            release in 0u64..4_000_000_000,
            duration in 0u64..10_000_000,
            now in 0u64..4_000_000_000,
            step in 0u64..1_000_000,
        ) {
            let a = time_lock_progress(release, duration, now);
            let b = time_lock_progress(release, duration, now + step);
            prop_assert!((0.0..=100.0).contains(&a));
            prop_assert!(b >= a);
            prop_assert_eq!(time_lock_progress(release, duration, release), 100.0);
        }
    }
}
