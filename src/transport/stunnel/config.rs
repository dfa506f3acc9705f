// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pure renderers for stunnel configuration documents and the server startup script.

use crate::constants::{
    CA_CRT_KEY, CLIENT_CRT_KEY, CLIENT_KEY_KEY, PSK_KEY, SERVER_CRT_KEY, SERVER_KEY_KEY,
    STUNNEL_CERTS_DIR, STUNNEL_CONFIG_PATH, STUNNEL_SERVER_IDLE_EXIT_SECS,
};
use crate::errors::TransferError;
use crate::templates::render;
use crate::transport::CredentialsType;

const SERVER_CONF_TEMPLATE: &str = include_str!("../../../templates/stunnel-server.conf.tmpl");
const CLIENT_CONF_TEMPLATE: &str = include_str!("../../../templates/stunnel-client.conf.tmpl");
const SERVER_SCRIPT_TEMPLATE: &str = include_str!("../../../templates/stunnel-server.sh.tmpl");

/// Fields of the server-side configuration document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfigFields {
    /// Port the endpoint routes tunnel traffic to
    pub accept_port: i32,
    /// Local port the mover daemon listens on
    pub connect_port: i32,
    pub credentials_type: CredentialsType,
    pub verify_level: u8,
}

/// Fields of the client-side configuration document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfigFields {
    /// Local port the mover client dials
    pub accept_port: i32,
    /// Remote tunnel hostname
    pub hostname: String,
    /// Remote tunnel port
    pub connect_port: i32,
    pub credentials_type: CredentialsType,
    pub verify_level: u8,
    pub no_verify_ca: bool,
    /// Proxy as `host:port`
    pub proxy: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
}

fn cert_path(key: &str) -> String {
    format!("{STUNNEL_CERTS_DIR}/{key}")
}

fn psk_block() -> String {
    format!("ciphers = PSK\nPSKsecrets = {}", cert_path(PSK_KEY))
}

fn tls_block(crt: &str, key: &str, verify: Option<u8>) -> String {
    let mut lines = vec![
        format!("key = {}", cert_path(key)),
        format!("cert = {}", cert_path(crt)),
    ];
    if let Some(level) = verify {
        lines.push(format!("CAfile = {}", cert_path(CA_CRT_KEY)));
        lines.push(format!("verify = {level}"));
    }
    lines.join("\n")
}

/// Render the server-side stunnel configuration.
///
/// # Errors
///
/// Returns an error if the template cannot be fully rendered.
pub fn render_server_config(fields: &ServerConfigFields) -> Result<String, TransferError> {
    let credentials = match fields.credentials_type {
        CredentialsType::Psk => psk_block(),
        CredentialsType::Tls => tls_block(SERVER_CRT_KEY, SERVER_KEY_KEY, Some(fields.verify_level)),
    };

    render(
        "stunnel server config",
        SERVER_CONF_TEMPLATE,
        &[
            ("CREDENTIALS", &credentials),
            ("ACCEPT_PORT", &fields.accept_port.to_string()),
            ("CONNECT_PORT", &fields.connect_port.to_string()),
        ],
    )
}

/// Render the client-side stunnel configuration.
///
/// # Errors
///
/// Returns an error if the template cannot be fully rendered.
pub fn render_client_config(fields: &ClientConfigFields) -> Result<String, TransferError> {
    let target = format!("{}:{}", fields.hostname, fields.connect_port);
    let connect = match &fields.proxy {
        Some(proxy) => {
            let mut lines = vec![
                "protocol = connect".to_string(),
                format!("connect = {proxy}"),
                format!("protocolHost = {target}"),
            ];
            if let Some(username) = fields.proxy_username.as_deref().filter(|u| !u.is_empty()) {
                lines.push(format!("protocolUsername = {username}"));
            }
            if let Some(password) = fields.proxy_password.as_deref().filter(|p| !p.is_empty()) {
                lines.push(format!("protocolPassword = {password}"));
            }
            lines.join("\n")
        }
        None => format!("connect = {target}"),
    };

    let credentials = match fields.credentials_type {
        CredentialsType::Psk => psk_block(),
        CredentialsType::Tls => {
            let verify = (!fields.no_verify_ca).then_some(fields.verify_level);
            tls_block(CLIENT_CRT_KEY, CLIENT_KEY_KEY, verify)
        }
    };

    render(
        "stunnel client config",
        CLIENT_CONF_TEMPLATE,
        &[
            ("ACCEPT_PORT", &fields.accept_port.to_string()),
            ("CONNECT", &connect),
            ("CREDENTIALS", &credentials),
        ],
    )
}

/// Render the server sidecar script: start stunnel, exit once the mover is gone.
///
/// # Errors
///
/// Returns an error if the template cannot be fully rendered.
pub fn render_server_script(connect_port: i32) -> Result<String, TransferError> {
    render(
        "stunnel server script",
        SERVER_SCRIPT_TEMPLATE,
        &[
            ("CONFIG_PATH", STUNNEL_CONFIG_PATH),
            ("CONNECT_PORT", &connect_port.to_string()),
            ("IDLE_EXIT_SECS", &STUNNEL_SERVER_IDLE_EXIT_SECS.to_string()),
        ],
    )
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
