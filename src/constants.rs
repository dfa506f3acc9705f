// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for PVC transfer.
//!
//! This module contains the numeric and string constants shared by the transport
//! and transfer layers. Constants are organized by category for easy maintenance.

// ============================================================================
// Naming Constants
// ============================================================================

/// Maximum length of a generated resource name.
///
/// Kubernetes allows 63 characters for DNS labels; one character is kept in
/// reserve so generated names can be used as label values as well.
pub const RESOURCE_NAME_MAX_LEN: usize = 62;

/// Number of hex characters kept from the identity hash.
pub const IDENTITY_SUFFIX_LEN: usize = 10;

/// Number of hex characters kept from a claim name hash for label-safe names.
pub const LABEL_SAFE_NAME_LEN: usize = 32;

/// Label-safe name used when a volume set contains a single claim.
pub const SINGLETON_LABEL_SAFE_NAME: &str = "data";

/// Field manager recorded on objects written through the Kubernetes API
pub const FIELD_MANAGER: &str = "pvc-transfer";

// ============================================================================
// Image Constants
// ============================================================================

/// Default image carrying both stunnel and rsync binaries
pub const DEFAULT_TRANSFER_IMAGE: &str = "quay.io/konveyor/rsync-transfer:latest";

// ============================================================================
// Stunnel Constants
// ============================================================================

/// Transport type name for the stunnel tunnel
pub const STUNNEL_TRANSPORT_TYPE: &str = "stunnel";

/// Transport type name when no tunnel is used
pub const NULL_TRANSPORT_TYPE: &str = "null";

/// Container name for the stunnel sidecar
pub const STUNNEL_CONTAINER: &str = "stunnel";

/// Component tag for stunnel configuration objects
pub const STUNNEL_CONFIG_COMPONENT: &str = "stunnel-config";

/// Component tag for stunnel credential objects
pub const STUNNEL_CREDENTIALS_COMPONENT: &str = "stunnel-credentials";

/// Key of the stunnel configuration document inside its `ConfigMap`
pub const STUNNEL_CONFIG_KEY: &str = "stunnel.conf";

/// Mount path of the stunnel configuration document
pub const STUNNEL_CONFIG_PATH: &str = "/etc/stunnel/stunnel.conf";

/// Mount directory of the stunnel credentials
pub const STUNNEL_CERTS_DIR: &str = "/etc/stunnel/certs";

/// Volume name for the stunnel configuration
pub const STUNNEL_CONFIG_VOLUME: &str = "stunnel-config";

/// Volume name for the stunnel credentials
pub const STUNNEL_CERTS_VOLUME: &str = "stunnel-certs";

/// Local port the server-side tunnel relays to (where rsync listens)
pub const STUNNEL_SERVER_CONNECT_PORT: i32 = 8080;

/// Local port the client-side tunnel listens on
pub const STUNNEL_CLIENT_LISTEN_PORT: i32 = 6443;

/// Hostname the co-located mover uses to reach the tunnel
pub const STUNNEL_LOCAL_HOSTNAME: &str = "localhost";

/// Default stunnel peer verification level
pub const STUNNEL_DEFAULT_VERIFY_LEVEL: u8 = 2;

/// Consecutive seconds without a reachable connect port before the server tunnel exits
pub const STUNNEL_SERVER_IDLE_EXIT_SECS: u32 = 10;

/// PSK identity written in front of the base64 secret
pub const PSK_IDENTITY: &str = "transfer";

/// Length of the random PSK secret before encoding
pub const PSK_SECRET_LEN: usize = 32;

// ============================================================================
// Credential Keys
// ============================================================================

/// CA certificate key in a TLS credential object
pub const CA_CRT_KEY: &str = "ca.crt";

/// CA private key in a TLS credential object
pub const CA_KEY_KEY: &str = "ca.key";

/// Server certificate key in a TLS credential object
pub const SERVER_CRT_KEY: &str = "server.crt";

/// Server private key in a TLS credential object
pub const SERVER_KEY_KEY: &str = "server.key";

/// Client certificate key in a TLS credential object
pub const CLIENT_CRT_KEY: &str = "client.crt";

/// Client private key in a TLS credential object
pub const CLIENT_KEY_KEY: &str = "client.key";

/// Secret key in a PSK credential object
pub const PSK_KEY: &str = "key";

// ============================================================================
// Certificate Constants
// ============================================================================

/// Validity of the CA and leaf certificates
pub const CERT_VALIDITY_YEARS: i64 = 10;

/// Serial number of the generated CA
pub const CA_SERIAL: u64 = 2021;

/// Serial number of the generated server leaf
pub const SERVER_CERT_SERIAL: u64 = 2020;

/// Serial number of the generated client leaf
pub const CLIENT_CERT_SERIAL: u64 = 2022;

/// Common name of the generated CA
pub const CA_COMMON_NAME: &str = "ca.pvc-transfer.dev";

/// Common name of the generated leaf certificates
pub const LEAF_COMMON_NAME: &str = "cert.pvc-transfer.dev";

// ============================================================================
// Rsync Constants
// ============================================================================

/// Container name for the rsync mover
pub const RSYNC_CONTAINER: &str = "rsync";

/// Component tag for rsync objects
pub const RSYNC_COMPONENT: &str = "rsync";

/// Key of the daemon configuration inside its `ConfigMap`
pub const RSYNCD_CONFIG_KEY: &str = "rsyncd.conf";

/// Mount path of the daemon configuration
pub const RSYNCD_CONFIG_PATH: &str = "/etc/rsyncd.conf";

/// Key of the daemon secrets file inside the credentials secret
pub const RSYNCD_SECRETS_KEY: &str = "credentials";

/// File name of the daemon secrets file
pub const RSYNCD_SECRETS_FILE: &str = "rsyncd.secrets";

/// Mount directory of the daemon secrets file
pub const RSYNCD_SECRETS_DIR: &str = "/etc/rsync-secret";

/// File mode of the daemon secrets file (rsync refuses group/world readable secrets)
pub const RSYNCD_SECRETS_MODE: i32 = 0o600;

/// Directory holding the daemon log
pub const RSYNCD_LOG_DIR: &str = "/var/log/rsyncd";

/// Log line rsync writes when a connection handler exits
pub const RSYNCD_EXIT_MARKER: &str = "_exit_cleanup";

/// Environment variable carrying the client password
pub const RSYNC_PASSWORD_ENV: &str = "RSYNC_PASSWORD";

/// Key holding the client password inside its secret
pub const RSYNC_PASSWORD_KEY: &str = "password";

/// Default user name for rsync daemon authentication
pub const RSYNC_DEFAULT_USER: &str = "root";

/// Root directory under which claims are mounted
pub const VOLUME_MOUNT_ROOT: &str = "/mnt";

/// Name of the module receiving termination sentinels
pub const TERMINATION_MODULE: &str = "termination";

/// Shared in-memory directory used between the mover and its tunnel
pub const COMMUNICATION_DIR: &str = "/usr/share/rsync";

/// Volume name of the shared communication directory
pub const COMMUNICATION_VOLUME: &str = "rsync-communication";

/// Sentinel file the client mover writes when it exits
pub const CLIENT_DONE_FILE: &str = "rsync-client-container-done";

/// Scratch directory the client stages its termination sentinel in
pub const CLIENT_STAGING_DIR: &str = "/tmp/termination";

/// Volume name of the daemon log directory
pub const RSYNCD_LOG_VOLUME: &str = "rsyncd-logs";

/// Default SecurityContextConstraints the mover service account may use
pub const DEFAULT_SCC_NAME: &str = "pvc-transfer-mover";

// ============================================================================
// Retry Constants
// ============================================================================

/// Seconds the client waits for the tunnel port to become reachable
pub const CLIENT_CONNECT_TIMEOUT_SECS: u32 = 120;

/// Maximum number of sync attempts
pub const CLIENT_SYNC_MAX_ATTEMPTS: u32 = 5;

/// Delay before the first sync retry, doubled on every attempt
pub const CLIENT_SYNC_INITIAL_BACKOFF_SECS: u32 = 2;

/// Default seconds a tunnel or daemon waits for termination sentinels before exiting anyway
pub const DEFAULT_SENTINEL_DEADLINE_SECS: u32 = 86_400;
