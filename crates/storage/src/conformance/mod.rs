//! Conformance test suite for `TransactionStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `TransactionStore` implementation can run to verify correctness. The
//! suite covers:
//!
//! - **Entries**: put/get idempotency by key, remove, clear, contract isolation
//! - **Update**: broadcast flag and status patches, payload left untouched
//! - **Notify**: one event per mutation, delivered to subscribers and
//!   listeners on every handle, weak listeners pruned when dropped
//! - **Concurrent**: last-writer-wins puts that never disturb other keys
//! - **Error handling**: correct error variants for invalid operations
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test. Clones of the store must be
//! handles onto the same backing data:
//!
//! ```ignore
//! use warden_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod entries;
mod error;
mod notify;
mod update;

use std::fmt;
use std::future::Future;

use warden_core::{Action, Address, B256};

use crate::record::EntryMetadata;
use crate::TransactionStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "entries", "notify").
    pub category: String,
    /// Test name (e.g. "put_then_get_returns_one_entry").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: TransactionStore + Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(entries::run_entry_tests(&factory).await);
    results.extend(update::run_update_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(notify::run_notify_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn contract_a() -> Address {
    Address::repeat_byte(0xa1)
}

fn contract_b() -> Address {
    Address::repeat_byte(0xb2)
}

fn metadata() -> EntryMetadata {
    EntryMetadata::signed(
        "MINT_TOKENS",
        B256::repeat_byte(0x11),
        Action::RequestAndApprove,
    )
}

fn payload(tag: &str) -> String {
    format!("{{\"tag\":\"{tag}\"}}")
}
