//! TLS trust chain bootstrap for the katib-controller webhook endpoint
//!
//! The admission webhook must present a certificate the API server can
//! verify against a CA bundle registered alongside the webhook
//! configuration. This module builds that chain in memory: a self-signed
//! CA, an RSA server key, a CSR bound to the service's cluster DNS
//! identities, and a CA-signed leaf certificate.
//!
//! # Security Model
//!
//! - The CA key pair exists only for the duration of one bootstrap call;
//!   it signs the leaf certificate and is then dropped.
//! - The returned [`CertBundle`] carries the CA *certificate* (for the
//!   webhook caBundle), the leaf certificate, and the server private key -
//!   never the CA private key.
//! - The bundle is memoized process-wide by [`CertStore`] so repeated
//!   reconciliation attempts do not rotate the leaf certificate.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, SanType, PKCS_RSA_SHA256,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// RSA modulus size for the CA and server keys
const RSA_KEY_BITS: usize = 2048;

/// CA certificate validity window
const CA_VALIDITY_DAYS: i64 = 3650;

/// Leaf certificate validity window
const CERT_VALIDITY_DAYS: i64 = 365;

/// Common name shared by the CA and leaf subjects
const COMMON_NAME: &str = "127.0.0.1";

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate or CSR generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Invalid CSR
    #[error("invalid CSR: {0}")]
    InvalidCsr(String),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// TLS material for the webhook endpoint
///
/// All fields are PEM text. The CA private key is deliberately absent: it
/// signs the leaf during bootstrap and never leaves that scope.
#[derive(Clone, Debug)]
pub struct CertBundle {
    /// CA certificate, registered as the webhook caBundle
    pub ca: String,
    /// CA-signed server certificate, mounted as `tls.crt`
    pub cert: String,
    /// Server private key, mounted as `tls.key`
    pub key: String,
}

/// The five DNS identities a webhook service answers on
///
/// Kubernetes resolves the webhook service through progressively qualified
/// names; the leaf certificate must cover all of them.
pub fn service_dns_names(app_name: &str, model_name: &str) -> [String; 5] {
    [
        app_name.to_string(),
        format!("{app_name}.{model_name}"),
        format!("{app_name}.{model_name}.svc"),
        format!("{app_name}.{model_name}.svc.cluster"),
        format!("{app_name}.{model_name}.svc.cluster.local"),
    ]
}

/// Generate the trust chain for a webhook service
///
/// Runs the fixed bootstrap sequence: CA key, server key, self-signed CA
/// certificate, CSR carrying the service DNS identities, CA-signed leaf.
/// Any failing step aborts the whole bootstrap; a partial chain is never
/// returned.
pub fn bootstrap(app_name: &str, model_name: &str) -> Result<CertBundle> {
    let (ca_key_pem, ca_key) = generate_rsa_key()?;
    let (server_key_pem, server_key) = generate_rsa_key()?;

    let ca_cert_pem = self_signed_ca(&ca_key)?;
    let csr_pem = server_csr(app_name, model_name, &server_key)?;
    let cert_pem = sign_csr(&csr_pem, &ca_cert_pem, &ca_key_pem, app_name, model_name)?;

    // ca_key / ca_key_pem drop here; only the CA certificate survives.
    Ok(CertBundle {
        ca: ca_cert_pem,
        cert: cert_pem,
        key: server_key_pem,
    })
}

/// Generate an RSA-2048 key and load it as an rcgen signing key
///
/// rcgen signs RSA keys but does not generate them, so the key material
/// comes from the rsa crate and crosses over as PKCS#8 PEM.
fn generate_rsa_key() -> Result<(String, KeyPair)> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| PkiError::KeyGenerationFailed(format!("failed to generate RSA key: {}", e)))?;

    let pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| PkiError::KeyGenerationFailed(format!("failed to encode RSA key: {}", e)))?;

    let key_pair = KeyPair::from_pem_and_sign_algo(&pem, &PKCS_RSA_SHA256)
        .map_err(|e| PkiError::ParseError(format!("failed to load RSA key: {}", e)))?;

    Ok((pem.to_string(), key_pair))
}

/// Self-sign the CA certificate: `CN=127.0.0.1`, ten-year validity
fn self_signed_ca(ca_key: &KeyPair) -> Result<String> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(COMMON_NAME.to_string()),
    );
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(CA_VALIDITY_DAYS);

    let cert = params.self_signed(ca_key).map_err(|e| {
        PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
    })?;

    Ok(cert.pem())
}

/// Build the server CSR carrying the service's subject alternative names
fn server_csr(app_name: &str, model_name: &str, server_key: &KeyPair) -> Result<String> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(COMMON_NAME.to_string()),
    );
    params.distinguished_name = dn;
    params.subject_alt_names = subject_alt_names(app_name, model_name)?;

    let csr = params.serialize_request(server_key).map_err(|e| {
        PkiError::CertificateGenerationFailed(format!("failed to create CSR: {}", e))
    })?;

    csr.pem().map_err(|e| {
        PkiError::CertificateGenerationFailed(format!("failed to serialize CSR: {}", e))
    })
}

/// Sign a server CSR with the CA, applying the webhook leaf extensions
///
/// The certificate parameters from the CSR are overridden so the CA stays
/// in control of validity, key usage, and the SAN set.
fn sign_csr(
    csr_pem: &str,
    ca_cert_pem: &str,
    ca_key_pem: &str,
    app_name: &str,
    model_name: &str,
) -> Result<String> {
    let mut csr_params = CertificateSigningRequestParams::from_pem(csr_pem)
        .map_err(|e| PkiError::InvalidCsr(format!("failed to parse CSR: {}", e)))?;

    csr_params.params.is_ca = IsCa::ExplicitNoCa;
    csr_params.params.use_authority_key_identifier_extension = true;
    csr_params.params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    csr_params.params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    csr_params.params.subject_alt_names = subject_alt_names(app_name, model_name)?;

    let now = OffsetDateTime::now_utc();
    csr_params.params.not_before = now;
    csr_params.params.not_after = now + Duration::days(CERT_VALIDITY_DAYS);

    let ca_key = KeyPair::from_pem_and_sign_algo(ca_key_pem, &PKCS_RSA_SHA256)
        .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))?;
    let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, &ca_key)
        .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

    let signed_cert = csr_params.signed_by(&issuer).map_err(|e| {
        PkiError::CertificateGenerationFailed(format!("failed to sign certificate: {}", e))
    })?;

    Ok(signed_cert.pem())
}

/// The exact SAN set: five DNS identities plus the loopback IP
fn subject_alt_names(app_name: &str, model_name: &str) -> Result<Vec<SanType>> {
    let mut sans = Vec::with_capacity(6);
    for name in service_dns_names(app_name, model_name) {
        let ia5 = Ia5String::try_from(name.clone()).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("invalid DNS name {}: {}", name, e))
        })?;
        sans.push(SanType::DnsName(ia5));
    }
    sans.push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    Ok(sans)
}

/// Process-wide memoization cell for the trust chain
///
/// The first successful bootstrap is cached for the process lifetime;
/// later reconciliation attempts reuse it rather than rotating the leaf
/// certificate on every upgrade. A failed bootstrap caches nothing.
#[derive(Default)]
pub struct CertStore {
    bundle: Mutex<Option<CertBundle>>,
}

impl CertStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached bundle, bootstrapping it on first use
    pub fn get_or_bootstrap(&self, app_name: &str, model_name: &str) -> Result<CertBundle> {
        let mut guard = self
            .bundle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(bundle) = guard.as_ref() {
            return Ok(bundle.clone());
        }

        let bundle = bootstrap(app_name, model_name)?;
        *guard = Some(bundle.clone());
        Ok(bundle)
    }

    /// Whether a bundle has been generated
    pub fn is_populated(&self) -> bool {
        self.bundle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::OnceLock;
    use x509_parser::prelude::*;

    /// RSA key generation dominates test time, so the default-identity
    /// bundle is bootstrapped once and shared.
    fn kubeflow_bundle() -> &'static CertBundle {
        static BUNDLE: OnceLock<CertBundle> = OnceLock::new();
        BUNDLE.get_or_init(|| bootstrap("katib-controller", "kubeflow").unwrap())
    }

    fn foreign_bundle() -> &'static CertBundle {
        static BUNDLE: OnceLock<CertBundle> = OnceLock::new();
        BUNDLE.get_or_init(|| bootstrap("my-webhook", "staging").unwrap())
    }

    fn leaf_der(bundle: &CertBundle) -> Vec<u8> {
        parse_pem(&bundle.cert).unwrap()
    }

    fn san_set(cert_der: &[u8]) -> BTreeSet<String> {
        let (_, cert) = X509Certificate::from_der(cert_der).unwrap();
        let san = cert
            .subject_alternative_name()
            .unwrap()
            .expect("leaf has no SAN extension");

        san.value
            .general_names
            .iter()
            .map(|name| match name {
                GeneralName::DNSName(dns) => dns.to_string(),
                GeneralName::IPAddress(ip) => {
                    assert_eq!(ip.len(), 4, "expected IPv4 address");
                    format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
                }
                other => panic!("unexpected SAN entry: {:?}", other),
            })
            .collect()
    }

    #[test]
    fn bundle_contains_full_chain() {
        let bundle = kubeflow_bundle();

        assert!(bundle.ca.contains("BEGIN CERTIFICATE"));
        assert!(bundle.cert.contains("BEGIN CERTIFICATE"));
        assert!(bundle.key.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn bundle_never_contains_ca_key() {
        let bundle = kubeflow_bundle();

        // The CA certificate field is a certificate, not a key, and the only
        // key in the bundle is the server key that signs the CSR.
        assert!(!bundle.ca.contains("PRIVATE KEY"));
        assert!(!bundle.cert.contains("PRIVATE KEY"));

        let key_der = parse_pem(&bundle.key).unwrap();
        let cert_der = leaf_der(&bundle);
        let (_, leaf) = X509Certificate::from_der(&cert_der).unwrap();
        let ca_der = parse_pem(&bundle.ca).unwrap();
        let (_, ca) = X509Certificate::from_der(&ca_der).unwrap();

        // The server key must match the leaf's public key, not the CA's.
        assert_ne!(
            leaf.public_key().raw,
            ca.public_key().raw,
            "leaf and CA must use independent keys"
        );
        assert!(!key_der.is_empty());
    }

    #[test]
    fn san_set_matches_service_identities_exactly() {
        let bundle = kubeflow_bundle();
        let sans = san_set(&leaf_der(bundle));

        let expected: BTreeSet<String> = [
            "katib-controller",
            "katib-controller.kubeflow",
            "katib-controller.kubeflow.svc",
            "katib-controller.kubeflow.svc.cluster",
            "katib-controller.kubeflow.svc.cluster.local",
            "127.0.0.1",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        assert_eq!(sans, expected);
    }

    #[test]
    fn san_set_tracks_identity_inputs() {
        let bundle = foreign_bundle();
        let sans = san_set(&leaf_der(bundle));

        assert!(sans.contains("my-webhook"));
        assert!(sans.contains("my-webhook.staging.svc.cluster.local"));
        assert!(!sans.contains("katib-controller"));
        assert_eq!(sans.len(), 6);
    }

    #[test]
    fn leaf_verifies_against_returned_ca() {
        let bundle = kubeflow_bundle();

        let cert_der = leaf_der(bundle);
        let (_, cert) = X509Certificate::from_der(&cert_der).unwrap();

        let ca_der = parse_pem(&bundle.ca).unwrap();
        let (_, ca_cert) = X509Certificate::from_der(&ca_der).unwrap();

        cert.verify_signature(Some(ca_cert.public_key()))
            .expect("leaf must verify against the bundle CA");
    }

    #[test]
    fn leaf_does_not_verify_against_foreign_ca() {
        let bundle = kubeflow_bundle();
        let other = foreign_bundle();

        let cert_der = leaf_der(bundle);
        let (_, cert) = X509Certificate::from_der(&cert_der).unwrap();

        let ca_der = parse_pem(&other.ca).unwrap();
        let (_, foreign_ca) = X509Certificate::from_der(&ca_der).unwrap();

        assert!(cert.verify_signature(Some(foreign_ca.public_key())).is_err());
    }

    #[test]
    fn leaf_is_marked_non_ca_with_server_usages() {
        let bundle = kubeflow_bundle();
        let cert_der = leaf_der(bundle);
        let (_, cert) = X509Certificate::from_der(&cert_der).unwrap();

        let bc = cert.basic_constraints().unwrap().expect("basicConstraints");
        assert!(!bc.value.ca);

        let ku = cert.key_usage().unwrap().expect("keyUsage").value;
        assert!(ku.digital_signature());
        assert!(ku.key_encipherment());
        assert!(ku.data_encipherment());

        let eku = cert
            .extended_key_usage()
            .unwrap()
            .expect("extendedKeyUsage")
            .value;
        assert!(eku.server_auth);
        assert!(eku.client_auth);
    }

    #[test]
    fn ca_is_marked_ca() {
        let bundle = kubeflow_bundle();
        let ca_der = parse_pem(&bundle.ca).unwrap();
        let (_, ca) = X509Certificate::from_der(&ca_der).unwrap();

        let bc = ca.basic_constraints().unwrap().expect("basicConstraints");
        assert!(bc.value.ca);
    }

    #[test]
    fn parse_pem_rejects_garbage() {
        let result = parse_pem("this is not valid PEM data at all");
        assert!(matches!(result, Err(PkiError::ParseError(_))));
    }

    // =========================================================================
    // CertStore
    // =========================================================================

    #[test]
    fn store_bootstraps_once_and_reuses() {
        let store = CertStore::new();
        assert!(!store.is_populated());

        let first = store.get_or_bootstrap("katib-controller", "kubeflow").unwrap();
        assert!(store.is_populated());

        let second = store.get_or_bootstrap("katib-controller", "kubeflow").unwrap();

        // Same cached material, not a regenerated chain.
        assert_eq!(first.cert, second.cert);
        assert_eq!(first.key, second.key);
        assert_eq!(first.ca, second.ca);
    }
}
