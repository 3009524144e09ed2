//! Subject Alternative Name (SAN) extraction for peer certificates
//!
//! The TLS layer hands verified client chains over as DER. These helpers pull
//! the SAN entries out of a leaf certificate so callers can map a peer to an
//! identity.

use crate::error::{TlsError, TlsResult};
use rustls::pki_types::CertificateDer;
use std::net::IpAddr;
use x509_parser::prelude::*;

/// SAN (Subject Alternative Name) types we extract
#[derive(Debug, Clone, PartialEq)]
pub enum SanEntry {
    /// DNS name (e.g., "robot-42.fleet.internal")
    DnsName(String),
    /// IP address
    IpAddress(IpAddr),
}

/// Match a DNS name against an exact or label-wildcard pattern
pub fn dns_name_matches(name: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return name.eq_ignore_ascii_case(pattern);
    }

    let pattern_parts: Vec<&str> = pattern.split('.').collect();
    let name_parts: Vec<&str> = name.split('.').collect();

    if pattern_parts.len() != name_parts.len() {
        return false;
    }

    pattern_parts
        .iter()
        .zip(name_parts.iter())
        .all(|(p, n)| *p == "*" || p.eq_ignore_ascii_case(n))
}

/// Extract SAN entries from a DER certificate
pub fn extract_san_entries(cert_der: &[u8]) -> TlsResult<Vec<SanEntry>> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| TlsError::CertificateParseError(e.to_string()))?;

    let san_ext = match cert.subject_alternative_name() {
        Ok(Some(san_ext)) => san_ext,
        Ok(None) => return Ok(Vec::new()),
        Err(e) => return Err(TlsError::CertificateParseError(e.to_string())),
    };

    let mut san_entries = Vec::new();
    for name in &san_ext.value.general_names {
        match name {
            GeneralName::DNSName(dns) => {
                san_entries.push(SanEntry::DnsName(dns.to_string()));
            }
            GeneralName::IPAddress(ip_bytes) => {
                if let Some(ip) = parse_ip_address(ip_bytes) {
                    san_entries.push(SanEntry::IpAddress(ip));
                }
            }
            _ => {}
        }
    }

    Ok(san_entries)
}

/// DNS names of a DER certificate, in certificate order
pub fn dns_names(cert_der: &[u8]) -> TlsResult<Vec<String>> {
    Ok(extract_san_entries(cert_der)?
        .into_iter()
        .filter_map(|entry| match entry {
            SanEntry::DnsName(name) => Some(name),
            SanEntry::IpAddress(_) => None,
        })
        .collect())
}

/// Decode the first PEM certificate block into DER
pub fn certificate_der_from_pem(cert_pem: &str) -> TlsResult<CertificateDer<'static>> {
    let block = ::pem::parse(cert_pem.as_bytes())?;
    if block.tag() != "CERTIFICATE" {
        return Err(TlsError::UnexpectedPemTag(block.tag().to_string()));
    }
    Ok(CertificateDer::from(block.into_contents()))
}

fn parse_ip_address(bytes: &[u8]) -> Option<IpAddr> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Some(IpAddr::from(octets));
    }
    <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert_generation::{generate_client_certificate, generate_dev_certificates};
    use rcgen::{CertificateParams, CustomExtension, KeyPair};

    #[test]
    fn test_extract_san_entries() {
        let bundle = generate_dev_certificates().unwrap();
        let der = certificate_der_from_pem(&bundle.server_cert).unwrap();
        let sans = extract_san_entries(&der).unwrap();

        assert!(sans
            .iter()
            .any(|san| matches!(san, SanEntry::DnsName(name) if name == "localhost")));
        assert!(sans
            .iter()
            .any(|san| matches!(san, SanEntry::IpAddress(ip) if ip.to_string() == "127.0.0.1")));
    }

    #[test]
    fn test_dns_names_preserve_order() {
        let bundle = generate_dev_certificates().unwrap();
        let client = generate_client_certificate(
            &bundle,
            &["robot-42.fleet.internal", "robot-42.backup.internal"],
        )
        .unwrap();
        let der = certificate_der_from_pem(&client.cert).unwrap();

        assert_eq!(
            dns_names(&der).unwrap(),
            vec![
                "robot-42.fleet.internal".to_string(),
                "robot-42.backup.internal".to_string()
            ]
        );
    }

    #[test]
    fn test_dns_names_of_certificate_without_sans() {
        let bundle = generate_dev_certificates().unwrap();
        let der = certificate_der_from_pem(&bundle.ca_cert).unwrap();
        assert!(dns_names(&der).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_der_is_rejected() {
        let result = dns_names(b"definitely not a certificate");
        assert!(matches!(result, Err(TlsError::CertificateParseError(_))));
    }

    #[test]
    fn test_private_key_pem_is_not_a_certificate() {
        let bundle = generate_dev_certificates().unwrap();
        let result = certificate_der_from_pem(&bundle.server_key);
        assert!(matches!(result, Err(TlsError::UnexpectedPemTag(_))));
    }

    #[test]
    fn test_duplicate_san_extension_is_rejected() {
        let mut params = CertificateParams::new(vec!["robot-42.fleet.internal".to_string()]).unwrap();
        // SEQUENCE { dNSName "dup.local" }
        let mut san = vec![0x30, 11, 0x82, 9];
        san.extend_from_slice(b"dup.local");
        params
            .custom_extensions
            .push(CustomExtension::from_oid_content(&[2, 5, 29, 17], san));
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();

        let result = dns_names(cert.der());
        assert!(matches!(result, Err(TlsError::CertificateParseError(_))));
    }

    #[test]
    fn test_dns_wildcard_match() {
        assert!(dns_name_matches("robot.fleet.internal", "*.fleet.internal"));
        assert!(dns_name_matches("ROBOT.fleet.internal", "robot.fleet.internal"));
        assert!(!dns_name_matches("robot.fleet.internal", "*.example.com"));
    }

    #[test]
    fn test_wildcard_pattern_parts_mismatch() {
        assert!(!dns_name_matches("a.b.c", "*.b"));
    }
}
