//! Probar Sync: adaptive synchronization for browser UI tests
//!
//! The layer page objects lean on before they act on a live page: condition
//! polling, element state waits, backoff-governed retries and soft assertions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    PROBAR SYNC Architecture                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌─────────────┐   ┌──────────────────┐   ┌─────────────────┐   │
//! │   │ Page Object │──►│ ElementState     │──►│ Condition       │   │
//! │   │ (caller)    │   │ Waiter           │   │ Poller          │   │
//! │   └─────────────┘   └──────────────────┘   └─────────────────┘   │
//! │          │                   ▲                      │            │
//! │          ▼                   │                      ▼            │
//! │   ┌─────────────┐   ┌──────────────────┐   ┌─────────────────┐   │
//! │   │ SoftAssert  │   │ RetryExecutor    │   │ ElementDriver   │   │
//! │   │ Collector   │   │ (backoff+jitter) │   │ (browser)       │   │
//! │   └─────────────┘   └──────────────────┘   └─────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timeouts are values ([`WaitOutcome::TimedOut`]), not errors. Retry
//! boundaries turn repeated failures into exactly one terminal outcome.
//! Soft assertions never fail until they are flushed.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod element_wait;
pub mod locator;
pub mod logging;
pub mod poller;
pub mod retry;
pub mod session;
pub mod soft;
pub mod verification;

mod result;

pub use clock::{Clock, FakeClock, SharedClock, SystemClock};
pub use config::{RetryDefaults, SyncConfig, TimeoutTable};
pub use diagnostics::{Diagnostics, ScreenshotCapture};
pub use driver::{DriverError, ElementDriver, ElementHandle};
pub use element_wait::{ElementState, ElementStateWaiter};
pub use locator::{By, Locator};
pub use logging::LogFormat;
pub use poller::{ConditionPoller, PollStats, WaitOutcome};
pub use result::{SyncError, SyncResult};
pub use retry::{
    compute_backoff, retry_scope, retrying, Classify, FailureKind, RetryAttemptRecord,
    RetryError, RetryExecutor, RetryExhausted, RetryPolicy, RetryPolicyBuilder, RetryScope,
};
pub use session::{Session, SessionRegistry};
pub use soft::{AggregatedAssertionFailure, AssertionFailure, AssertionSummary, SoftAssertionCollector};
pub use verification::{await_link_state, LinkState, LinkStateSource};

/// Everything a page object usually needs, in one import
pub mod prelude {
    pub use super::clock::*;
    pub use super::config::*;
    pub use super::diagnostics::*;
    pub use super::driver::*;
    pub use super::element_wait::*;
    pub use super::locator::*;
    pub use super::poller::*;
    pub use super::result::*;
    pub use super::retry::*;
    pub use super::session::*;
    pub use super::soft::*;
    pub use super::verification::*;
}
