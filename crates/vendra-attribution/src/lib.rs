//! # vendra-attribution
//!
//! Consistency engine for SIM card attribution in the vendra CRM.
//!
//! A SIM card and the client holding it are linked by a denormalized,
//! two-sided reference with no foreign key between the tables. This crate
//! owns every write to that pair and heals whatever drifts anyway:
//!
//! - **Validator** — pure decision: is this (client, card) attribution
//!   legal against current stored state?
//! - **Executor** — performs the attribution or release as one atomic
//!   transaction spanning both rows, with a row lock closing the
//!   check-then-act race between concurrent requests.
//! - **Auditor** — read-only drift report (counts plus bounded samples),
//!   safe to run at any time.
//! - **ReconciliationEngine** — idempotent five-phase repair pass,
//!   scheduled periodically by the worker and also exposed as a narrow
//!   single-client fast path.
//!
//! Validation failures are business errors surfaced verbatim; storage
//! failures are transient and the whole call may be retried.

pub mod auditor;
pub mod error;
pub mod executor;
pub mod reconcile;
pub mod validator;
pub mod worker;

pub use auditor::{AuditReport, ConsistencyAuditor, MAX_SAMPLES};
pub use error::{AttributionError, AttributionResult, RejectReason};
pub use executor::{AttributionExecutor, AttributionOutcome};
pub use reconcile::{ReconcileStats, ReconciliationEngine};
pub use validator::{AttributionValidator, Validation};
pub use worker::{ReconcileWorker, ReconcileWorkerConfig};
