// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pure renderers for the rsync daemon configuration and the mover startup scripts.

use crate::constants::{
    CLIENT_CONNECT_TIMEOUT_SECS, CLIENT_DONE_FILE, CLIENT_STAGING_DIR,
    CLIENT_SYNC_INITIAL_BACKOFF_SECS, CLIENT_SYNC_MAX_ATTEMPTS, COMMUNICATION_DIR,
    RSYNCD_EXIT_MARKER, RSYNCD_LOG_DIR, RSYNCD_SECRETS_DIR, RSYNCD_SECRETS_FILE,
    STUNNEL_CONFIG_PATH, TERMINATION_MODULE,
};
use crate::errors::TransferError;
use crate::templates::render;
use crate::volumes::{TransferVolume, VolumeSet};
use regex::Regex;
use std::sync::LazyLock;

const RSYNCD_CONF_TEMPLATE: &str = include_str!("../../../templates/rsyncd.conf.tmpl");
const SERVER_SCRIPT_TEMPLATE: &str = include_str!("../../../templates/rsync-server.sh.tmpl");
const CLIENT_SCRIPT_TEMPLATE: &str = include_str!("../../../templates/rsync-client.sh.tmpl");
const TUNNEL_WAIT_TEMPLATE: &str = include_str!("../../../templates/tunnel-client-wait.sh.tmpl");

static DAEMON_USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]{0,31}$").expect("daemon user pattern must compile")
});

static DAEMON_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]{0,251}[A-Za-z0-9])?$")
        .expect("daemon host pattern must compile")
});

/// Check a user name before it is written into `rsyncd.conf` or a mover script.
///
/// # Errors
///
/// Returns [`TransferError::InvalidDaemonAddress`] unless `username` is a plain
/// POSIX-style user name.
pub fn validate_daemon_user(username: &str) -> Result<(), TransferError> {
    if DAEMON_USER.is_match(username) {
        Ok(())
    } else {
        Err(TransferError::InvalidDaemonAddress {
            field: "user".to_string(),
            value: username.to_string(),
        })
    }
}

/// Check the host a client mover dials before it is written into its script.
///
/// # Errors
///
/// Returns [`TransferError::InvalidDaemonAddress`] unless `host` is a DNS name or
/// an IPv4 address.
pub fn validate_daemon_host(host: &str) -> Result<(), TransferError> {
    if DAEMON_HOST.is_match(host) {
        Ok(())
    } else {
        Err(TransferError::InvalidDaemonAddress {
            field: "host".to_string(),
            value: host.to_string(),
        })
    }
}

/// Directory the termination module writes sentinels into
#[must_use]
pub fn termination_dir() -> String {
    format!("{COMMUNICATION_DIR}/{TERMINATION_MODULE}")
}

/// Sentinel file a client delivers once its sync attempts are over; it holds the
/// final rsync exit code
#[must_use]
pub fn sentinel_name(volume: &TransferVolume) -> String {
    format!("{}.done", volume.label_safe_name())
}

fn auth_lines(username: Option<&str>) -> String {
    username.map_or_else(String::new, |user| {
        format!(
            "    auth users = {user}\n    secrets file = {RSYNCD_SECRETS_DIR}/{RSYNCD_SECRETS_FILE}\n"
        )
    })
}

/// Render `rsyncd.conf`: one module per volume plus the termination module.
///
/// With `allow_localhost_only` the daemon only accepts connections from the tunnel
/// running in the same pod.
///
/// # Errors
///
/// Returns an error if the user name is unsafe to embed, or the template cannot
/// be fully rendered.
pub fn render_rsyncd_conf(
    volumes: &VolumeSet,
    allow_localhost_only: bool,
    username: Option<&str>,
) -> Result<String, TransferError> {
    if let Some(user) = username {
        validate_daemon_user(user)?;
    }
    let hosts_allow = if allow_localhost_only {
        "::1, 127.0.0.1, localhost"
    } else {
        "*.*.*.*, *"
    };
    let auth = auth_lines(username);

    let mut modules = String::new();
    for volume in volumes.iter() {
        modules.push_str(&format!(
            "\n[{lsn}]\n    comment = archive for {ns}/{name}\n    path = {path}\n    use chroot = no\n    munge symlinks = no\n    list = yes\n    read only = false\n{auth}",
            lsn = volume.label_safe_name(),
            ns = volume.namespace(),
            name = volume.name(),
            path = volume.mount_path(),
        ));
    }
    modules.push_str(&format!(
        "\n[{TERMINATION_MODULE}]\n    comment = termination sentinels\n    path = {}\n    use chroot = no\n    list = no\n    read only = false\n{auth}",
        termination_dir(),
    ));

    render(
        "rsyncd.conf",
        RSYNCD_CONF_TEMPLATE,
        &[("HOSTS_ALLOW", hosts_allow), ("MODULES", &modules)],
    )
}

/// Render the server mover script.
///
/// The daemon is supervised until its log shows a finished connection handler and
/// every volume's sentinel has arrived through the termination module. The script
/// exits 0 when every sentinel reports success and 1 when any volume failed or the
/// sentinels did not all arrive within `deadline_secs`.
///
/// # Errors
///
/// Returns an error if the template cannot be fully rendered.
pub fn render_server_script(
    volumes: &VolumeSet,
    port: i32,
    deadline_secs: u32,
) -> Result<String, TransferError> {
    let sentinels: Vec<String> = volumes.iter().map(sentinel_name).collect();
    render(
        "rsync server script",
        SERVER_SCRIPT_TEMPLATE,
        &[
            ("TERMINATION_DIR", &termination_dir()),
            ("PORT", &port.to_string()),
            ("LOG_DIR", RSYNCD_LOG_DIR),
            ("DEADLINE_SECS", &deadline_secs.to_string()),
            ("SENTINELS", &sentinels.join(" ")),
            ("EXIT_MARKER", RSYNCD_EXIT_MARKER),
        ],
    )
}

/// Inputs of one client mover script.
#[derive(Clone, Copy, Debug)]
pub struct ClientScriptFields<'a> {
    pub volume: &'a TransferVolume,
    /// Validated rsync flags
    pub options: &'a [String],
    pub username: &'a str,
    /// Host the mover dials: the local tunnel or the remote endpoint
    pub host: &'a str,
    pub port: i32,
}

fn daemon_url(fields: &ClientScriptFields<'_>, module: &str) -> String {
    format!(
        "rsync://{}@{}:{}/{}/",
        fields.username, fields.host, fields.port, module
    )
}

/// Render the client mover script for one volume.
///
/// Waits for the daemon port, syncs with bounded exponential backoff, then delivers
/// the volume's termination sentinel carrying the final exit code, whether the sync
/// succeeded or not. The sync exit status is the script's.
///
/// # Errors
///
/// Returns an error if the user name or host is unsafe to embed, or the template
/// cannot be fully rendered.
pub fn render_client_script(fields: &ClientScriptFields<'_>) -> Result<String, TransferError> {
    validate_daemon_user(fields.username)?;
    validate_daemon_host(fields.host)?;

    let source = format!("{}/", fields.volume.mount_path());
    render(
        "rsync client script",
        CLIENT_SCRIPT_TEMPLATE,
        &[
            ("COMMUNICATION_DIR", COMMUNICATION_DIR),
            ("DONE_FILE", CLIENT_DONE_FILE),
            ("CONNECT_TIMEOUT", &CLIENT_CONNECT_TIMEOUT_SECS.to_string()),
            ("HOST", fields.host),
            ("PORT", &fields.port.to_string()),
            ("INITIAL_BACKOFF", &CLIENT_SYNC_INITIAL_BACKOFF_SECS.to_string()),
            ("MAX_ATTEMPTS", &CLIENT_SYNC_MAX_ATTEMPTS.to_string()),
            ("OPTIONS", &fields.options.join(" ")),
            ("SOURCE", &source),
            (
                "DESTINATION",
                &daemon_url(fields, fields.volume.label_safe_name()),
            ),
            ("STAGING_DIR", CLIENT_STAGING_DIR),
            ("SENTINEL", &sentinel_name(fields.volume)),
            (
                "TERMINATION_DESTINATION",
                &daemon_url(fields, TERMINATION_MODULE),
            ),
        ],
    )
}

/// Render the client tunnel script: run stunnel until the mover is done or the
/// deadline passes, whichever comes first.
///
/// # Errors
///
/// Returns an error if the template cannot be fully rendered.
pub fn render_tunnel_wait_script(deadline_secs: u32) -> Result<String, TransferError> {
    render(
        "tunnel wait script",
        TUNNEL_WAIT_TEMPLATE,
        &[
            ("CONFIG_PATH", STUNNEL_CONFIG_PATH),
            ("DEADLINE_SECS", &deadline_secs.to_string()),
            ("COMMUNICATION_DIR", COMMUNICATION_DIR),
            ("DONE_FILE", CLIENT_DONE_FILE),
        ],
    )
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
