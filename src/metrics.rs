// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for PVC transfer.
//!
//! Every metric is registered in [`METRICS_REGISTRY`] under the `pvc_transfer_`
//! prefix. This crate runs no HTTP server: the embedding controller serves the
//! registry (or the text rendered by [`gather_metrics`]) from its own `/metrics`.
//!
//! | Metric | Labels |
//! |--------|--------|
//! | `pvc_transfer_reconciles_total` | `unit`, `outcome` |
//! | `pvc_transfer_reconcile_duration_seconds` | `unit` |
//! | `pvc_transfer_resources_reconciled_total` | `kind`, `operation` |
//! | `pvc_transfer_certificate_bundles_generated_total` | `type` |
//! | `pvc_transfer_cleanup_marks_total` | `kind` |
//! | `pvc_transfer_errors_total` | `kind`, `error_type` |
//!
//! ```rust,no_run
//! use pvc_transfer::metrics::{gather_metrics, record_resource_operation};
//!
//! record_resource_operation("ConfigMap", "created");
//! println!("{}", gather_metrics().unwrap());
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

const PREFIX: &str = "pvc_transfer";

/// Reconcile passes of a transport or transfer rarely exceed a few seconds.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0, 30.0];

/// Registry holding every metric of this crate
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register_counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(format!("{PREFIX}_{name}"), help), labels)
        .expect("counter definition must be valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("counter must register once");
    counter
}

/// Reconcile passes per unit (`StunnelServer`, `RsyncClient`, ...) and outcome
pub static RECONCILES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "reconciles_total",
        "Reconcile passes by unit and outcome",
        &["unit", "outcome"],
    )
});

pub static RECONCILE_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{PREFIX}_reconcile_duration_seconds"),
        "Wall time of reconcile passes by unit",
    )
    .buckets(DURATION_BUCKETS.to_vec());
    let histogram = HistogramVec::new(opts, &["unit"]).expect("histogram definition must be valid");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("histogram must register once");
    histogram
});

/// Owned objects by kind and `created`/`updated`/`unchanged`
pub static RESOURCES_RECONCILED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "resources_reconciled_total",
        "Owned objects reconciled by kind and operation",
        &["kind", "operation"],
    )
});

/// Freshly generated tunnel credentials (`tls` bundles or `psk` keys)
pub static CERTIFICATE_BUNDLES_GENERATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "certificate_bundles_generated_total",
        "Tunnel credentials generated by type",
        &["type"],
    )
});

pub static CLEANUP_MARKS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "cleanup_marks_total",
        "Objects labelled for cleanup by kind",
        &["kind"],
    )
});

/// Failures by kind and [`crate::errors::TransferError::error_type`]
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "errors_total",
        "Failures by kind and error type",
        &["kind", "error_type"],
    )
});

/// Record one reconcile pass of `unit` and how long it took.
pub fn record_reconciliation(unit: &str, duration: Duration, success: bool) {
    let outcome = if success { "success" } else { "error" };
    RECONCILES_TOTAL.with_label_values(&[unit, outcome]).inc();
    RECONCILE_DURATION_SECONDS
        .with_label_values(&[unit])
        .observe(duration.as_secs_f64());
}

pub fn record_resource_operation(kind: &str, operation: &str) {
    RESOURCES_RECONCILED_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn record_credentials_generated(credentials_type: &str) {
    CERTIFICATE_BUNDLES_GENERATED_TOTAL
        .with_label_values(&[credentials_type])
        .inc();
}

pub fn record_cleanup_mark(kind: &str) {
    CLEANUP_MARKS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_error(kind: &str, error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[kind, error_type]).inc();
}

/// Render the registry in the Prometheus text exposition format.
///
/// # Errors
///
/// Returns an error if encoding fails or produces invalid UTF-8.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
