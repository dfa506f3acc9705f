// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate bundle for mutual-TLS tunnels.
//!
//! A bundle is a self-signed CA plus one client and one server leaf, both signed
//! directly by that CA. Bundles are generated whole and never patched: the two leaves
//! must chain to the same CA, so rotating one of them alone would break the tunnel.
//!
//! Keys are ECDSA P-256, the default of `rcgen`.

use crate::constants::{
    CA_COMMON_NAME, CA_CRT_KEY, CA_KEY_KEY, CA_SERIAL, CERT_VALIDITY_YEARS, CLIENT_CERT_SERIAL,
    CLIENT_CRT_KEY, CLIENT_KEY_KEY, LEAF_COMMON_NAME, SERVER_CERT_SERIAL, SERVER_CRT_KEY,
    SERVER_KEY_KEY,
};
use crate::errors::CertificateError;
use k8s_openapi::ByteString;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SerialNumber, SigningKey,
};
use std::collections::BTreeMap;
use x509_parser::prelude::*;

/// Every key a TLS credential object must carry.
pub const REQUIRED_KEYS: [&str; 6] = [
    CA_CRT_KEY,
    CA_KEY_KEY,
    SERVER_CRT_KEY,
    SERVER_KEY_KEY,
    CLIENT_CRT_KEY,
    CLIENT_KEY_KEY,
];

/// PEM-encoded CA plus server and client leaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateBundle {
    pub ca_crt: String,
    pub ca_key: String,
    pub server_crt: String,
    pub server_key: String,
    pub client_crt: String,
    pub client_key: String,
}

fn compute_validity(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    let not_after = now + ::time::Duration::days(years * 365);
    (now, not_after)
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String("PVC Transfer".to_string()),
    );
    dn.push(
        DnType::OrganizationalUnitName,
        DnValue::Utf8String("Engineering".to_string()),
    );
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    dn
}

fn leaf_params(serial: u64) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(LEAF_COMMON_NAME);
    params.serial_number = Some(SerialNumber::from(serial));
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];
    let (not_before, not_after) = compute_validity(CERT_VALIDITY_YEARS);
    params.not_before = not_before;
    params.not_after = not_after;
    params
}

fn sign_leaf(
    serial: u64,
    issuer: &Issuer<'_, impl SigningKey>,
    role: &str,
) -> Result<(String, String), CertificateError> {
    let key = KeyPair::generate().map_err(|e| {
        CertificateError::KeyGeneration(format!("failed to generate {role} key: {e}"))
    })?;
    let cert = leaf_params(serial).signed_by(&key, issuer).map_err(|e| {
        CertificateError::Generation(format!("failed to sign {role} cert: {e}"))
    })?;
    Ok((cert.pem(), key.serialize_pem()))
}

impl CertificateBundle {
    /// Generate a fresh CA and sign a server and a client leaf with it.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or signing fails.
    pub fn generate() -> Result<Self, CertificateError> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(CA_COMMON_NAME);
        params.serial_number = Some(SerialNumber::from(CA_SERIAL));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        let (not_before, not_after) = compute_validity(CERT_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let ca_key = KeyPair::generate().map_err(|e| {
            CertificateError::KeyGeneration(format!("failed to generate CA key: {e}"))
        })?;
        let ca_cert = params.self_signed(&ca_key).map_err(|e| {
            CertificateError::Generation(format!("failed to create CA cert: {e}"))
        })?;
        let ca_crt = ca_cert.pem();
        let ca_key_pem = ca_key.serialize_pem();

        let issuer = Issuer::from_ca_cert_pem(&ca_crt, ca_key)
            .map_err(|e| CertificateError::Parse(format!("failed to create issuer: {e}")))?;

        let (server_crt, server_key) = sign_leaf(SERVER_CERT_SERIAL, &issuer, "server")?;
        let (client_crt, client_key) = sign_leaf(CLIENT_CERT_SERIAL, &issuer, "client")?;

        Ok(Self {
            ca_crt,
            ca_key: ca_key_pem,
            server_crt,
            server_key,
            client_crt,
            client_key,
        })
    }

    /// Load a bundle from credential object data; `None` if any key is missing or not UTF-8.
    #[must_use]
    pub fn from_secret_data(data: &BTreeMap<String, ByteString>) -> Option<Self> {
        let field = |key: &str| {
            data.get(key)
                .and_then(|value| String::from_utf8(value.0.clone()).ok())
                .filter(|value| !value.is_empty())
        };

        Some(Self {
            ca_crt: field(CA_CRT_KEY)?,
            ca_key: field(CA_KEY_KEY)?,
            server_crt: field(SERVER_CRT_KEY)?,
            server_key: field(SERVER_KEY_KEY)?,
            client_crt: field(CLIENT_CRT_KEY)?,
            client_key: field(CLIENT_KEY_KEY)?,
        })
    }

    /// Credential object data for this bundle.
    #[must_use]
    pub fn to_secret_data(&self) -> BTreeMap<String, ByteString> {
        [
            (CA_CRT_KEY, &self.ca_crt),
            (CA_KEY_KEY, &self.ca_key),
            (SERVER_CRT_KEY, &self.server_crt),
            (SERVER_KEY_KEY, &self.server_key),
            (CLIENT_CRT_KEY, &self.client_crt),
            (CLIENT_KEY_KEY, &self.client_key),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), ByteString(value.as_bytes().to_vec())))
        .collect()
    }

    /// True when both leaves verify against the bundled CA.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        verify_certificate(&self.ca_crt, &self.server_crt).unwrap_or(false)
            && verify_certificate(&self.ca_crt, &self.client_crt).unwrap_or(false)
    }
}

/// True when credential object data holds a complete bundle whose leaves verify.
#[must_use]
pub fn is_bundle_data_valid(data: &BTreeMap<String, ByteString>) -> bool {
    CertificateBundle::from_secret_data(data).is_some_and(|bundle| bundle.is_valid())
}

/// Parse PEM-encoded data and return the DER bytes
///
/// # Errors
///
/// Returns an error if the input is not PEM.
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>, CertificateError> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| CertificateError::Parse(format!("failed to parse PEM: {e}")))?;
    Ok(pem_obj.contents().to_vec())
}

/// Verify that `crt_pem` was issued directly by the CA in `ca_pem`.
///
/// Intermediate CAs are not accepted: the leaf issuer must be the CA subject, the CA
/// must be marked as a CA, the signature must verify with the CA public key and both
/// certificates must be inside their validity period.
///
/// Returns `Ok(false)` for a well-formed certificate that does not verify.
///
/// # Errors
///
/// Returns an error if either certificate cannot be parsed.
pub fn verify_certificate(ca_pem: &str, crt_pem: &str) -> Result<bool, CertificateError> {
    let ca_der = parse_pem(ca_pem)?;
    let (_, ca) = X509Certificate::from_der(&ca_der)
        .map_err(|e| CertificateError::Parse(format!("failed to parse CA cert: {e}")))?;

    let crt_der = parse_pem(crt_pem)?;
    let (_, crt) = X509Certificate::from_der(&crt_der)
        .map_err(|e| CertificateError::Parse(format!("failed to parse cert: {e}")))?;

    if !ca.is_ca() {
        return Ok(false);
    }
    if crt.issuer().as_raw() != ca.subject().as_raw() {
        return Ok(false);
    }
    if crt.verify_signature(Some(ca.public_key())).is_err() {
        return Ok(false);
    }

    Ok(ca.validity().is_valid() && crt.validity().is_valid())
}

#[cfg(test)]
#[path = "certs_tests.rs"]
mod certs_tests;
