// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # pvc-transfer - Persistent volume transfer for Kubernetes
//!
//! pvc-transfer provisions and supervises the workloads that copy the contents of
//! persistent volume claims from one cluster location to another: an rsync data
//! mover on each side, connected through a stunnel TLS (or PSK) tunnel.
//!
//! ## Overview
//!
//! This library is consumed by higher-level controllers. It provides:
//!
//! - Deterministic naming of every owned object from the volume set
//! - Certificate bundle generation and validation for the tunnel
//! - Tunnel configuration for the server and client ends
//! - The rsync daemon and client workloads, with in-pod retry and termination logic
//! - Idempotent create-or-update reconciliation and label-based cleanup marking
//!
//! ## Modules
//!
//! - [`volumes`] - Volume sets and their identity
//! - [`naming`] - Identity suffixes and resource names
//! - [`transport`] - Tunnel ends (`stunnel`, null) and the certificate bundle
//! - [`transfer`] - Rsync server and client
//! - [`endpoint`] - How the server side is reached
//! - [`reconcilers`] - Create-or-update and mark-for-cleanup
//! - [`store`] - Object store abstraction over the Kubernetes API
//!
//! ## Example
//!
//! ```rust,no_run
//! use pvc_transfer::context::ReconcileContext;
//! use pvc_transfer::endpoint::StaticEndpoint;
//! use pvc_transfer::store::MemoryStore;
//! use pvc_transfer::transfer::{RsyncServer, RsyncServerOptions};
//! use pvc_transfer::transport::{StunnelServer, TransportOptions};
//! use pvc_transfer::volumes::VolumeSet;
//! use k8s_openapi::api::core::v1::PersistentVolumeClaim;
//!
//! async fn example(claims: Vec<PersistentVolumeClaim>) -> Result<(), pvc_transfer::errors::TransferError> {
//!     let store = MemoryStore::new();
//!     let context = ReconcileContext::default();
//!     let volumes = VolumeSet::new(claims)?;
//!     let endpoint = StaticEndpoint::new("rsync.example.com", 6443, 443);
//!
//!     let transport = StunnelServer::reconcile(
//!         &store,
//!         volumes.identity(),
//!         &endpoint,
//!         &context,
//!         TransportOptions::default(),
//!     )
//!     .await?;
//!     let _server = RsyncServer::reconcile(
//!         &store,
//!         volumes,
//!         endpoint,
//!         transport,
//!         &context,
//!         RsyncServerOptions::default(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod constants;
pub mod context;
pub mod endpoint;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod naming;
pub mod reconcilers;
pub mod store;
pub mod templates;
pub mod transfer;
pub mod transport;
pub mod volumes;
