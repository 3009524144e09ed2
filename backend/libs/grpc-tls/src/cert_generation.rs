//! Certificate Generation for Development and Testing
//!
//! Generates a throwaway CA plus server and client certificates so mTLS and
//! certificate-derived identities can be exercised locally.
//! **WARNING**: NEVER use in production - use proper CA-signed certificates.

use crate::error::TlsResult;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    SanType,
};
use std::fs;
use std::path::Path;
use tracing::info;

const DEV_CA_COMMON_NAME: &str = "Nova Development CA";
const DEV_ORGANIZATION: &str = "Nova Development";

/// Bundle of certificates for development
#[derive(Clone)]
pub struct CertificateBundle {
    /// CA certificate (PEM)
    pub ca_cert: String,
    /// CA private key (PEM)
    pub ca_key: String,
    /// Server certificate signed by CA (PEM)
    pub server_cert: String,
    /// Server private key (PEM)
    pub server_key: String,
    /// Client certificate for mTLS (PEM)
    pub client_cert: String,
    /// Client private key (PEM)
    pub client_key: String,
}

/// A client certificate signed by the development CA
#[derive(Clone)]
pub struct ClientCertificate {
    /// Certificate (PEM)
    pub cert: String,
    /// Private key (PEM)
    pub key: String,
}

/// Generate development certificates (CA, server, client)
///
/// The server certificate carries `localhost`, `*.nova-backend.svc.cluster.local`
/// and `127.0.0.1`; the client certificate carries `client.localhost`.
pub fn generate_dev_certificates() -> TlsResult<CertificateBundle> {
    let ca_keypair = KeyPair::generate()?;
    let ca_cert = dev_ca_params().self_signed(&ca_keypair)?;

    let mut server_params = leaf_params("localhost");
    server_params
        .subject_alt_names
        .push(SanType::DnsName("localhost".try_into()?));
    server_params
        .subject_alt_names
        .push(SanType::DnsName("*.nova-backend.svc.cluster.local".try_into()?));
    server_params
        .subject_alt_names
        .push(SanType::IpAddress(std::net::IpAddr::V4(
            std::net::Ipv4Addr::new(127, 0, 0, 1),
        )));

    let server_keypair = KeyPair::generate()?;
    let server_cert = server_params.signed_by(&server_keypair, &ca_cert, &ca_keypair)?;

    let client = sign_client(&ca_cert, &ca_keypair, &["client.localhost"])?;

    info!("Generated development certificates (CA, server, client)");

    Ok(CertificateBundle {
        ca_cert: ca_cert.pem(),
        ca_key: ca_keypair.serialize_pem(),
        server_cert: server_cert.pem(),
        server_key: server_keypair.serialize_pem(),
        client_cert: client.cert,
        client_key: client.key,
    })
}

/// Issue an additional client certificate from a bundle's CA
///
/// The first DNS name doubles as the subject common name.
pub fn generate_client_certificate(
    bundle: &CertificateBundle,
    dns_names: &[&str],
) -> TlsResult<ClientCertificate> {
    let ca_keypair = KeyPair::from_pem(&bundle.ca_key)?;
    let ca_cert = dev_ca_params().self_signed(&ca_keypair)?;
    sign_client(&ca_cert, &ca_keypair, dns_names)
}

/// Write certificate bundle to files
///
/// Creates directory structure:
/// ```text
/// certs/
///   ca.crt        (CA certificate)
///   ca.key        (CA private key)
///   server.crt    (Server certificate)
///   server.key    (Server private key)
///   client.crt    (Client certificate)
///   client.key    (Client private key)
/// ```
pub fn write_cert_bundle(bundle: &CertificateBundle, output_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(output_dir)?;

    fs::write(output_dir.join("ca.crt"), &bundle.ca_cert)?;
    fs::write(output_dir.join("ca.key"), &bundle.ca_key)?;
    fs::write(output_dir.join("server.crt"), &bundle.server_cert)?;
    fs::write(output_dir.join("server.key"), &bundle.server_key)?;
    fs::write(output_dir.join("client.crt"), &bundle.client_cert)?;
    fs::write(output_dir.join("client.key"), &bundle.client_key)?;

    info!(output_dir = ?output_dir, "Certificate bundle written to disk");
    Ok(())
}

fn dev_ca_params() -> CertificateParams {
    let mut ca_params = CertificateParams::default();
    ca_params.distinguished_name = DistinguishedName::new();
    ca_params
        .distinguished_name
        .push(DnType::CommonName, DEV_CA_COMMON_NAME);
    ca_params
        .distinguished_name
        .push(DnType::OrganizationName, DEV_ORGANIZATION);
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
}

fn leaf_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params
        .distinguished_name
        .push(DnType::OrganizationName, DEV_ORGANIZATION);
    params
}

fn sign_client(
    ca_cert: &Certificate,
    ca_keypair: &KeyPair,
    dns_names: &[&str],
) -> TlsResult<ClientCertificate> {
    let mut client_params = leaf_params(dns_names.first().copied().unwrap_or("client"));
    for name in dns_names {
        client_params
            .subject_alt_names
            .push(SanType::DnsName((*name).try_into()?));
    }

    let client_keypair = KeyPair::generate()?;
    let client_cert = client_params.signed_by(&client_keypair, ca_cert, ca_keypair)?;

    Ok(ClientCertificate {
        cert: client_cert.pem(),
        key: client_keypair.serialize_pem(),
    })
}
