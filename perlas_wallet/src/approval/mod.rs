//! Auto-approval: decides whether a completed payment releases funds, and
//! releases them exactly once.

pub mod approver;
pub mod errors;
pub mod policy;

pub use approver::{ApprovalOutcome, DepositApprover};
pub use errors::{ApprovalError, ApprovalResult};
pub use policy::{ApprovalPolicy, ApprovalTrigger, MethodPolicy};
