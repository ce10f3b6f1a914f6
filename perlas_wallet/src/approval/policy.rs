//! Per-method release policy.

use std::collections::HashMap;

use crate::deposit::{DepositRequest, PaymentMethod};

/// What releases funds for a payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodPolicy {
    /// A completed charge response releases funds immediately
    pub auto_approval_eligible: bool,
    /// A gateway confirmation webhook releases funds
    pub release_on_webhook: bool,
}

/// What is asking for the release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalTrigger {
    /// The synchronous response to charge creation reported completion
    ChargeResponse,
    /// A verified gateway webhook reported completion
    GatewayConfirmation,
    /// An operator validated the payment
    Operator,
}

impl std::fmt::Display for ApprovalTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalTrigger::ChargeResponse => write!(f, "charge_response"),
            ApprovalTrigger::GatewayConfirmation => write!(f, "gateway_confirmation"),
            ApprovalTrigger::Operator => write!(f, "operator"),
        }
    }
}

/// Release policy table
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    methods: HashMap<PaymentMethod, MethodPolicy>,
}

impl ApprovalPolicy {
    /// Policy for a method; unknown methods release only through an operator
    pub fn for_method(&self, method: PaymentMethod) -> MethodPolicy {
        self.methods.get(&method).copied().unwrap_or(MethodPolicy {
            auto_approval_eligible: false,
            release_on_webhook: false,
        })
    }

    /// Override one method's policy
    pub fn with_method(mut self, method: PaymentMethod, policy: MethodPolicy) -> Self {
        self.methods.insert(method, policy);
        self
    }

    /// Whether `trigger` may release a pending deposit
    pub fn allows(&self, deposit: &DepositRequest, trigger: ApprovalTrigger) -> bool {
        match trigger {
            ApprovalTrigger::ChargeResponse => deposit.auto_approval_eligible,
            ApprovalTrigger::GatewayConfirmation => {
                deposit.auto_approval_eligible
                    || self.for_method(deposit.payment_method).release_on_webhook
            }
            ApprovalTrigger::Operator => true,
        }
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        let methods = HashMap::from([
            (
                PaymentMethod::Card,
                MethodPolicy {
                    auto_approval_eligible: true,
                    release_on_webhook: true,
                },
            ),
            (
                PaymentMethod::BankTransfer,
                MethodPolicy {
                    auto_approval_eligible: false,
                    release_on_webhook: true,
                },
            ),
            (
                PaymentMethod::Store,
                MethodPolicy {
                    auto_approval_eligible: false,
                    release_on_webhook: true,
                },
            ),
            (
                PaymentMethod::ManualDeposit,
                MethodPolicy {
                    auto_approval_eligible: false,
                    release_on_webhook: false,
                },
            ),
        ]);
        Self { methods }
    }
}
