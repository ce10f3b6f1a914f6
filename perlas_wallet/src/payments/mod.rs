//! Payment entry points: deposit creation, charge issuance and
//! transaction lookups.

pub mod errors;
pub mod service;

pub use errors::{PaymentError, PaymentResult};
pub use service::{DEFAULT_GATEWAY_TIMEOUT, PaymentResponse, PaymentService};
