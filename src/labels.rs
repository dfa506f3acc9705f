// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants applied to owned objects.
//!
//! Caller-supplied labels are propagated verbatim; the keys below are added on
//! top so that pods can be selected by role and traced back to their claim.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture (e.g., "rsync-server")
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_PVC_TRANSFER: &str = "pvc-transfer";

/// Component value for the rsync server pod
pub const COMPONENT_RSYNC_SERVER: &str = "rsync-server";

/// Component value for rsync client pods
pub const COMPONENT_RSYNC_CLIENT: &str = "rsync-client";

// ============================================================================
// PVC Transfer Annotations
// ============================================================================

/// Annotation on client pods naming the claim they copy
pub const PVC_ANNOTATION: &str = "pvc";
