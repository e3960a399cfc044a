//! Smoke Screen Unit tests for the approval engine components
//!
//! These test are unit tests that span the codebase, testing behavior in
//! isolation from integration scenarios. These are intended as smoke-screen
//! and generally test the happy-path.

use hr_approval::{
    transaction::{
        AttendanceCorrection, ContractAction, ContractOp, DeductionProposal, LeaveRequest,
        Transaction, TransactionData,
    },
    types::{Actor, Decision, Role, TimeStamp},
    utils::new_uuid_to_bech32,
    workflow::{self, Action, Stage, Status},
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_uuid_to_bech32 generates valid bech32-encoded strings
    /// with the correct human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let result = new_uuid_to_bech32("txn_");
        assert!(result.is_ok());

        let encoded = result.unwrap();
        assert!(encoded.starts_with("txn_1"));
        assert!(encoded.len() > 10); // UUID should produce substantial output
    }

    /// Test that the function handles empty strings appropriately
    #[test]
    fn handles_empty_hrp() {
        // Empty string should fail
        let result = new_uuid_to_bech32("");
        assert!(result.is_err());
    }

    /// Test that multiple calls generate unique identifiers
    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("txn_").unwrap();
        let id2 = new_uuid_to_bech32("txn_").unwrap();

        assert_ne!(id1, id2);
    }
}

// WORKFLOW MODULE TESTS
#[cfg(test)]
mod workflow_tests {
    use super::*;

    fn leave(days: u32) -> Transaction {
        Transaction::submit(TransactionData::LeaveRequest(LeaveRequest {
            employee_id: "emp_1".into(),
            days,
            from: TimeStamp::new(),
            note: None,
        }))
        .unwrap()
    }

    fn contract() -> Transaction {
        Transaction::submit(TransactionData::ContractAction(ContractAction {
            employee_id: "emp_1".into(),
            op: ContractOp::Renew,
            effective: TimeStamp::new(),
        }))
        .unwrap()
    }

    fn at_executor(mut txn: Transaction) -> Transaction {
        txn.current_stage = Stage::Executor;
        txn.status = Status::Approved;
        txn
    }

    /// Approval at a review stage advances the stage and stays pending
    #[test]
    fn approve_advances_one_stage() {
        let txn = leave(3);
        let supervisor = Actor::new("u1", "Sami", Role::Supervisor);

        let outcome = workflow::route(&txn, Action::Approve, &supervisor, None).unwrap();

        assert_eq!(outcome.stage, Stage::Ops);
        assert_eq!(outcome.status, Status::Pending);
        assert_eq!(outcome.decision, Decision::Approve);
    }

    /// Reaching the executor stage flips the status to approved
    #[test]
    fn last_review_approval_becomes_approved() {
        let mut txn = leave(3);
        txn.current_stage = Stage::Ops;
        let ops = Actor::new("u2", "Omar", Role::Ops);

        let outcome = workflow::route(&txn, Action::Approve, &ops, None).unwrap();

        assert_eq!(outcome.stage, Stage::Executor);
        assert_eq!(outcome.status, Status::Approved);
    }

    /// A rejection at a review stage is terminal and records its source
    #[test]
    fn review_rejection_is_terminal() {
        let txn = leave(3);
        let supervisor = Actor::new("u1", "Sami", Role::Supervisor);

        let outcome = workflow::route(&txn, Action::Reject, &supervisor, None).unwrap();

        assert_eq!(outcome.status, Status::Rejected);
        assert_eq!(outcome.rejection_source, Some(Stage::Supervisor));
        assert!(!outcome.ceo_rejected);
    }

    /// Any action against a terminal transaction is InvalidState
    #[test]
    fn terminal_records_refuse_all_actions() {
        let mut txn = leave(3);
        txn.status = Status::Rejected;
        let supervisor = Actor::new("u1", "Sami", Role::Supervisor);

        for action in [
            Action::Approve,
            Action::Reject,
            Action::Return { to: Stage::Ceo },
        ] {
            let err = workflow::route(&txn, action, &supervisor, None).unwrap_err();
            assert!(matches!(
                err,
                hr_approval::error::EngineError::InvalidState(_)
            ));
        }
    }

    /// When both markers are set, ceo_rejected decides the return target
    #[test]
    fn ceo_flag_takes_precedence_over_rejection_source() {
        let mut txn = at_executor(contract());
        txn.ceo_rejected = true;
        txn.rejection_source = Some(Stage::HrAdmin);
        let gm = Actor::new("u3", "Ghada", Role::Gm);

        // returning to the rejection_source stage is refused
        let err = workflow::route(
            &txn,
            Action::Return { to: Stage::HrAdmin },
            &gm,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            hr_approval::error::EngineError::InvalidState(_)
        ));

        // the CEO is the only legal target
        let outcome = workflow::route(&txn, Action::Return { to: Stage::Ceo }, &gm, None).unwrap();
        assert_eq!(outcome.stage, Stage::Ceo);
        assert!(!outcome.ceo_rejected);
        assert_eq!(outcome.rejection_source, None);
    }

    /// Without the ceo flag, rejection_source alone picks the target
    #[test]
    fn rejection_source_alone_picks_the_return_target() {
        let mut txn = at_executor(contract());
        txn.rejection_source = Some(Stage::Ceo);
        let gm = Actor::new("u3", "Ghada", Role::Gm);

        let outcome = workflow::route(&txn, Action::Return { to: Stage::Ceo }, &gm, None).unwrap();

        assert_eq!(outcome.stage, Stage::Ceo);
        assert_eq!(outcome.status, Status::Pending);
    }

    /// Executor rejection with a proper reason is terminal
    #[test]
    fn executor_rejection_with_reason_is_terminal() {
        let txn = at_executor(leave(3));
        let gm = Actor::new("u3", "Ghada", Role::Gm);

        let outcome =
            workflow::route(&txn, Action::Reject, &gm, Some("policy ceiling exceeded")).unwrap();

        assert_eq!(outcome.status, Status::Rejected);
        assert_eq!(outcome.rejection_source, Some(Stage::Executor));
    }
}

// TRANSACTION MODULE TESTS
#[cfg(test)]
mod transaction_tests {
    use super::*;

    /// The deduction proposal lifecycle: pending -> approved via the
    /// manager, with the trace-free payload intact
    #[test]
    fn deduction_proposal_reaches_approved() {
        let mut txn = Transaction::submit(TransactionData::DeductionProposal(DeductionProposal {
            employee_id: "emp_2".into(),
            amount: 15_000,
            months: 2,
            reason: "salary advance".into(),
        }))
        .unwrap();
        assert_eq!(txn.status, Status::Pending);
        assert_eq!(txn.current_stage, Stage::Manager);

        let manager = Actor::new("u4", "Mona", Role::Manager);
        let outcome = workflow::route(&txn, Action::Approve, &manager, Some("verified")).unwrap();
        txn.apply(outcome, &manager, Some("verified"));

        assert_eq!(txn.status, Status::Approved);
        assert_eq!(txn.current_stage, Stage::Executor);
        assert_eq!(txn.approval_chain.len(), 1);
        assert_eq!(txn.version, 1);
    }

    /// Each mutation appends exactly one ledger entry and bumps version
    #[test]
    fn version_and_chain_move_together() {
        let mut txn = Transaction::submit(TransactionData::LeaveRequest(LeaveRequest {
            employee_id: "emp_3".into(),
            days: 2,
            from: TimeStamp::new(),
            note: Some("family visit".into()),
        }))
        .unwrap();

        let supervisor = Actor::new("u1", "Sami", Role::Supervisor);
        let outcome = workflow::route(&txn, Action::Approve, &supervisor, None).unwrap();
        txn.apply(outcome, &supervisor, None);

        assert_eq!(txn.version as usize, txn.approval_chain.len());

        let ops = Actor::new("u2", "Omar", Role::Ops);
        let outcome = workflow::route(&txn, Action::Approve, &ops, None).unwrap();
        txn.apply(outcome, &ops, None);

        assert_eq!(txn.version as usize, txn.approval_chain.len());
    }

    /// An attendance correction for a fixed day walks supervisor -> HR
    /// admin -> executor
    #[test]
    fn attendance_correction_reaches_executor() {
        let mut txn =
            Transaction::submit(TransactionData::AttendanceCorrection(AttendanceCorrection {
                employee_id: "emp_5".into(),
                day: TimeStamp::new_with(2026, 8, 3, 0, 0, 0),
                check_in: Some(TimeStamp::new_with(2026, 8, 3, 8, 30, 0)),
                check_out: None,
                reason: "badge reader offline".into(),
            }))
            .unwrap();
        assert_eq!(txn.current_stage, Stage::Supervisor);
        assert!(txn.ref_no.starts_with("at_1"));

        let supervisor = Actor::new("u1", "Sami", Role::Supervisor);
        let outcome = workflow::route(&txn, Action::Approve, &supervisor, None).unwrap();
        txn.apply(outcome, &supervisor, None);
        assert_eq!(txn.current_stage, Stage::HrAdmin);

        let hr = Actor::new("u5", "Huda", Role::HrAdmin);
        let outcome = workflow::route(&txn, Action::Approve, &hr, None).unwrap();
        txn.apply(outcome, &hr, None);

        assert_eq!(txn.current_stage, Stage::Executor);
        assert_eq!(txn.status, Status::Approved);
    }

    /// Cancellation is a distinct terminal outcome with the reason on file
    #[test]
    fn cancel_records_reason_and_terminates() {
        let mut txn = Transaction::submit(TransactionData::LeaveRequest(LeaveRequest {
            employee_id: "emp_4".into(),
            days: 2,
            from: TimeStamp::new(),
            note: None,
        }))
        .unwrap();

        let supervisor = Actor::new("u1", "Sami", Role::Supervisor);
        txn.record_cancel(&supervisor, "employee withdrew the request".into());

        assert_eq!(txn.status, Status::Cancelled);
        assert!(txn.is_terminal());
        assert_eq!(
            txn.approval_chain.last().unwrap().note.as_deref(),
            Some("employee withdrew the request")
        );
    }
}
