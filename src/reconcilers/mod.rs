// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation discipline shared by transports, endpoints and transfers.
//!
//! - [`resources`] - get-or-create-then-mutate, with frozen pod specs
//! - [`cleanup`] - label-based mark-for-cleanup
//!
//! Neither module retries: a lost optimistic-concurrency race is returned to the
//! caller, which re-runs its whole reconciliation pass.

pub mod cleanup;
pub mod resources;

pub use cleanup::{mark_all_for_cleanup, mark_for_cleanup, OwnedKind, OwnedObject};
pub use resources::{create_or_update, create_or_update_pod, OperationResult};
