//! e.firma credential: certificate, private key and the RFC they belong to.
//!
//! The certificate is DER X.509; the private key is DER PKCS#8 encrypted
//! with the holder's passphrase. The RFC is read from the certificate
//! subject (`x500UniqueIdentifier`, "RFC / CURP").
//!
//! Key material lives in types that zeroize on drop, so it is erased on
//! every exit path once the [`Credential`] goes out of scope.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;
use zeroize::Zeroizing;

use crate::config::validate_rfc;
use crate::error::CredentialError;

/// Subject attribute carrying "RFC / CURP" in e.firma certificates.
const X500_UNIQUE_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.45");

/// Loaded signer for one synchronization session.
///
/// NOTE: `Debug` is implemented by hand so that key material never shows up
/// in logs.
pub struct Credential {
    rfc: String,
    certificate_der: Vec<u8>,
    certificate_number: String,
    valid_until: Option<DateTime<Utc>>,
    public_key: RsaPublicKey,
    signing_key: SigningKey<Sha1>,
}

impl Credential {
    /// Load a credential from certificate bytes, encrypted key bytes and
    /// passphrase. No network call is made.
    ///
    /// # Errors
    /// Fails when the certificate cannot be decoded, the key cannot be
    /// decrypted, the two do not form a pair, or the subject carries no RFC.
    pub fn load(
        certificate: &[u8],
        private_key: &[u8],
        passphrase: Zeroizing<String>,
    ) -> Result<Self, CredentialError> {
        let cert = Certificate::from_der(certificate)
            .map_err(|e| CredentialError::Certificate(e.to_string()))?;

        let key = RsaPrivateKey::from_pkcs8_encrypted_der(private_key, passphrase.as_bytes())
            .map_err(|e| CredentialError::PrivateKey(e.to_string()))?;

        let spki_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| CredentialError::Certificate(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| CredentialError::PublicKey(e.to_string()))?;

        if public_key != key.to_public_key() {
            return Err(CredentialError::KeyMismatch);
        }

        let rfc = extract_rfc(&cert)?;
        let certificate_number = render_serial(cert.tbs_certificate.serial_number.as_bytes());
        let valid_until = cert
            .tbs_certificate
            .validity
            .not_after
            .to_unix_duration()
            .as_secs()
            .try_into()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        tracing::debug!(rfc = %rfc, certificate_number = %certificate_number, "credential loaded");

        Ok(Self {
            rfc,
            certificate_der: certificate.to_vec(),
            certificate_number,
            valid_until,
            public_key,
            signing_key: SigningKey::<Sha1>::new(key),
        })
    }

    /// RFC of the certificate holder.
    #[must_use]
    pub fn rfc(&self) -> &str {
        &self.rfc
    }

    #[must_use]
    pub fn certificate_base64(&self) -> String {
        STANDARD.encode(&self.certificate_der)
    }

    /// Certificate number as printed by the tax authority.
    #[must_use]
    pub fn certificate_number(&self) -> &str {
        &self.certificate_number
    }

    /// End of the certificate validity period.
    #[must_use]
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Sign `data` with RSA PKCS#1 v1.5 over SHA-1.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CredentialError> {
        self.signing_key
            .try_sign(data)
            .map(|signature| signature.to_vec())
            .map_err(|e| CredentialError::Signing(e.to_string()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("rfc", &self.rfc)
            .field("certificate_number", &self.certificate_number)
            .field("valid_until", &self.valid_until)
            .field("signing_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Check that the three inputs form a usable credential.
pub fn validate_credentials(
    certificate: &[u8],
    private_key: &[u8],
    passphrase: Zeroizing<String>,
) -> Result<(), CredentialError> {
    Credential::load(certificate, private_key, passphrase).map(|_| ())
}

fn extract_rfc(cert: &Certificate) -> Result<String, CredentialError> {
    let value = cert
        .tbs_certificate
        .subject
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == X500_UNIQUE_IDENTIFIER)
        .map(|atv| String::from_utf8_lossy(atv.value.value()).into_owned())
        .ok_or(CredentialError::MissingRfc(None))?;

    let rfc = value
        .split('/')
        .next()
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_default();

    if validate_rfc(&rfc).is_err() {
        return Err(CredentialError::MissingRfc(Some(value)));
    }
    Ok(rfc)
}

/// e.firma serial numbers are ASCII digits stored as bytes; anything else is
/// shown as hex.
fn render_serial(bytes: &[u8]) -> String {
    if !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit) {
        bytes.iter().map(|b| char::from(*b)).collect()
    } else {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
