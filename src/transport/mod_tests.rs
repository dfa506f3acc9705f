// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `transport/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::{CredentialsType, ProxyOptions, TransportOptions, TransportType};
    use crate::errors::TransferError;

    fn proxy(url: &str) -> ProxyOptions {
        ProxyOptions {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_transport_type_parsing() {
        assert_eq!("stunnel".parse::<TransportType>().unwrap(), TransportType::Stunnel);
        assert_eq!("NULL".parse::<TransportType>().unwrap(), TransportType::Null);
        assert!(matches!(
            "wireguard".parse::<TransportType>(),
            Err(TransferError::UnsupportedTransportType(t)) if t == "wireguard"
        ));
    }

    #[test]
    fn test_credentials_type_parsing() {
        assert_eq!("tls".parse::<CredentialsType>().unwrap(), CredentialsType::Tls);
        assert_eq!("PSK".parse::<CredentialsType>().unwrap(), CredentialsType::Psk);
        assert!(matches!(
            "kerberos".parse::<CredentialsType>(),
            Err(TransferError::UnsupportedCredentialsType(_))
        ));
    }

    #[test]
    fn test_proxy_without_scheme() {
        assert_eq!(
            proxy("proxy.example.com:3128").host_port().unwrap(),
            "proxy.example.com:3128"
        );
    }

    #[test]
    fn test_proxy_with_scheme_and_path() {
        assert_eq!(
            proxy("http://proxy.example.com:8080/").host_port().unwrap(),
            "proxy.example.com:8080"
        );
    }

    #[test]
    fn test_proxy_default_port() {
        assert_eq!(
            proxy("https://proxy.example.com").host_port().unwrap(),
            "proxy.example.com:443"
        );
    }

    #[test]
    fn test_proxy_invalid() {
        assert!(matches!(
            proxy("http://").host_port(),
            Err(TransferError::InvalidProxyUrl { .. })
        ));
    }

    #[test]
    fn test_default_options() {
        let options = TransportOptions::default();

        assert_eq!(options.image, "quay.io/konveyor/rsync-transfer:latest");
        assert_eq!(options.ca_verify_level, 2);
        assert_eq!(options.credentials.credentials_type, CredentialsType::Tls);
        assert!(options.credentials.secret_ref.is_none());
    }
}
