//! Live fixtures for the unit tests: keys, certificates, CRLs, attestation
//! statements and full credentials, all generated with openssl.
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::{self, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Private, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer};
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509Extension, X509Name, X509NameBuilder, X509NameRef, X509};
use serde::Serialize;
use serde_cbor_2::Value;

use crate::attestation::VerificationContext;
use crate::base64_data::Base64UrlSafeData;
use crate::chain::CertificateChainValidator;
use crate::constants::*;
use crate::crypto::compute_sha256;
use crate::interface::{
    Aaguid, AuthenticatorData, COSEAlgorithm, COSEKeyType, CredentialPublicKey, ECDSACurve,
};
use crate::proto::{
    AuthenticatorAssertionResponseRaw, AuthenticatorAttestationResponseRaw,
    ClientExtensionResults, PublicKeyCredential, RegisterPublicKeyCredential,
};

pub const ORIGIN: &str = "https://example.com";
pub const RP_ID: &str = "example.com";
pub const CHALLENGE: [u8; 32] = [0x5a; 32];
pub const AAGUID: Aaguid = [
    0xad, 0xce, 0x00, 0x02, 0x35, 0xbc, 0xc6, 0x0a, 0x64, 0x8b, 0x0b, 0x25, 0xf1, 0xf0, 0x55, 0x03,
];
pub const CREDENTIAL_ID: [u8; 16] = [0x42; 16];
pub const CRL_URI: &str = "http://crl.example.com/ca.crl";
pub const TPM_FIRMWARE_VERSION: u64 = 0x0007_0002_0000_0001;

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1000);

fn next_serial() -> u32 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn b64url(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

// Keys

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn ed25519_key() -> PKey<Private> {
    PKey::generate_ed25519().unwrap()
}

pub fn public_pem(key: &PKeyRef<Private>) -> String {
    String::from_utf8(key.public_key_to_pem().unwrap()).unwrap()
}

pub fn public_pkey(key: &PKeyRef<Private>) -> PKey<Public> {
    PKey::public_key_from_pem(&key.public_key_to_pem().unwrap()).unwrap()
}

/// The COSE_Key encoding of the public half of `key`.
pub fn cose_value(key: &PKeyRef<Private>, alg: COSEAlgorithm) -> Value {
    let mut m = BTreeMap::new();
    m.insert(Value::Integer(3), Value::Integer(alg as i32 as i128));
    match key.id() {
        Id::EC => {
            let ec = key.ec_key().unwrap();
            let group = ec.group();
            let mut ctx = BigNumContext::new().unwrap();
            let mut x = BigNum::new().unwrap();
            let mut y = BigNum::new().unwrap();
            ec.public_key()
                .affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)
                .unwrap();
            let (crv, size) = match group.curve_name() {
                Some(Nid::X9_62_PRIME256V1) => (1, 32),
                Some(Nid::SECP384R1) => (2, 48),
                Some(Nid::SECP521R1) => (3, 66),
                c => panic!("unexpected curve {:?}", c),
            };
            m.insert(Value::Integer(1), Value::Integer(2));
            m.insert(Value::Integer(-1), Value::Integer(crv));
            m.insert(Value::Integer(-2), Value::Bytes(x.to_vec_padded(size).unwrap()));
            m.insert(Value::Integer(-3), Value::Bytes(y.to_vec_padded(size).unwrap()));
        }
        Id::RSA => {
            let rsa = key.rsa().unwrap();
            m.insert(Value::Integer(1), Value::Integer(3));
            m.insert(Value::Integer(-1), Value::Bytes(rsa.n().to_vec()));
            m.insert(Value::Integer(-2), Value::Bytes(rsa.e().to_vec()));
        }
        Id::ED25519 => {
            m.insert(Value::Integer(1), Value::Integer(1));
            m.insert(Value::Integer(-1), Value::Integer(6));
            m.insert(Value::Integer(-2), Value::Bytes(key.raw_public_key().unwrap()));
        }
        id => panic!("unexpected key type {:?}", id),
    }
    Value::Map(m)
}

pub fn sign(alg: COSEAlgorithm, key: &PKeyRef<Private>, data: &[u8]) -> Vec<u8> {
    let md = match alg {
        COSEAlgorithm::EDDSA => {
            let mut signer = Signer::new_without_digest(key).unwrap();
            return signer.sign_oneshot_to_vec(data).unwrap();
        }
        COSEAlgorithm::ES256 | COSEAlgorithm::RS256 | COSEAlgorithm::PS256 => {
            MessageDigest::sha256()
        }
        COSEAlgorithm::ES384 | COSEAlgorithm::RS384 | COSEAlgorithm::PS384 => {
            MessageDigest::sha384()
        }
        COSEAlgorithm::ES512 | COSEAlgorithm::RS512 | COSEAlgorithm::PS512 => {
            MessageDigest::sha512()
        }
        COSEAlgorithm::INSECURE_RS1 => MessageDigest::sha1(),
    };
    let mut signer = Signer::new(md, key).unwrap();
    if matches!(
        alg,
        COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512
    ) {
        signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
        signer
            .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
            .unwrap();
        signer.set_rsa_mgf1_md(md).unwrap();
    }
    signer.update(data).unwrap();
    signer.sign_to_vec().unwrap()
}

// DER

fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    der_tagged(&[tag], content)
}

fn der_tagged(tag: &[u8], content: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

fn der_uint(v: u32) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(3);
    let mut content = bytes[start..].to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    der(0x02, &content)
}

pub fn der_extension(oid: &str, critical: bool, value: &[u8]) -> X509Extension {
    let oid = Asn1Object::from_str(oid).unwrap();
    let value = Asn1OctetString::new_from_bytes(value).unwrap();
    X509Extension::new_from_der(&oid, critical, &value).unwrap()
}

pub fn aaguid_extension(aaguid: &Aaguid, critical: bool) -> X509Extension {
    der_extension("1.3.6.1.4.1.45724.1.1.4", critical, &der(0x04, aaguid))
}

pub fn apple_nonce_extension(nonce: &[u8; 32]) -> X509Extension {
    let value = der(0x30, &der(0xa1, &der(0x04, nonce)));
    der_extension("1.2.840.113635.100.8.2", false, &value)
}

/// A KeyDescription with TEE security levels, origin GENERATED and purpose SIGN.
pub fn android_key_extension(challenge: &[u8], all_applications: bool) -> X509Extension {
    let software_enforced = if all_applications {
        // [600] allApplications NULL
        der(0x30, &der_tagged(&[0xbf, 0x84, 0x58], &[0x05, 0x00]))
    } else {
        der(0x30, &[])
    };

    let mut tee = Vec::new();
    // [1] purpose SET OF INTEGER
    tee.extend(der(0xa1, &der(0x31, &der_uint(2))));
    // [702] origin INTEGER
    tee.extend(der_tagged(&[0xbf, 0x85, 0x3e], &der_uint(0)));
    let tee_enforced = der(0x30, &tee);

    let mut desc = Vec::new();
    desc.extend(der_uint(3));
    desc.extend(der(0x0a, &[1]));
    desc.extend(der_uint(4));
    desc.extend(der(0x0a, &[1]));
    desc.extend(der(0x04, challenge));
    desc.extend(der(0x04, &[]));
    desc.extend(software_enforced);
    desc.extend(tee_enforced);

    der_extension("1.3.6.1.4.1.11129.2.1.17", false, &der(0x30, &desc))
}

fn crl_dp_extension(uri: &str) -> X509Extension {
    let value = der(
        0x30,
        &der(0x30, &der(0xa0, &der(0xa0, &der(0x86, uri.as_bytes())))),
    );
    der_extension("2.5.29.31", false, &value)
}

fn tpm_san_extension() -> X509Extension {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text(TCG_AT_TPM_MANUFACTURER, "id:414D4400")
        .unwrap();
    name.append_entry_by_text(TCG_AT_TPM_MODEL, "NPCT6xx").unwrap();
    name.append_entry_by_text(TCG_AT_TPM_VERSION, "id:13").unwrap();
    let name = name.build().to_der().unwrap();
    der_extension("2.5.29.17", true, &der(0x30, &der(0xa4, &name)))
}

// Certificates

fn build_name(entries: &[(&str, &str)]) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    for (k, v) in entries {
        name.append_entry_by_text(k, v).unwrap();
    }
    name.build()
}

struct Validity {
    not_before: Asn1Time,
    not_after: Asn1Time,
}

impl Validity {
    fn current() -> Self {
        Validity {
            not_before: Asn1Time::days_from_now(0).unwrap(),
            not_after: Asn1Time::days_from_now(1).unwrap(),
        }
    }

    fn expired() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        Validity {
            not_before: Asn1Time::from_unix(now - 2 * 86400).unwrap(),
            not_after: Asn1Time::from_unix(now - 86400).unwrap(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn issue(
    issuer_key: &PKeyRef<Private>,
    issuer_name: Option<&X509NameRef>,
    subject_key: &PKeyRef<Private>,
    subject: &X509NameRef,
    serial: u32,
    validity: &Validity,
    ca: bool,
    extensions: Vec<X509Extension>,
) -> X509 {
    let mut cert_builder = X509::builder().unwrap();
    // Yes, 2 actually means 3 here ...
    cert_builder.set_version(2).unwrap();
    let serial_number = BigNum::from_u32(serial)
        .and_then(|serial| serial.to_asn1_integer())
        .unwrap();
    cert_builder.set_serial_number(&serial_number).unwrap();
    cert_builder.set_subject_name(subject).unwrap();
    cert_builder
        .set_issuer_name(issuer_name.unwrap_or(subject))
        .unwrap();
    cert_builder.set_not_before(&validity.not_before).unwrap();
    cert_builder.set_not_after(&validity.not_after).unwrap();
    cert_builder.set_pubkey(subject_key).unwrap();

    if ca {
        cert_builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        cert_builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }
    for ext in extensions {
        cert_builder.append_extension(ext).unwrap();
    }

    cert_builder
        .sign(issuer_key, hash::MessageDigest::sha256())
        .unwrap();
    cert_builder.build()
}

pub fn issue_leaf_from(
    issuer_key: &PKeyRef<Private>,
    issuer_cert: &X509,
    key: &PKeyRef<Private>,
    subject: &[(&str, &str)],
    extensions: Vec<X509Extension>,
) -> X509 {
    issue(
        issuer_key,
        Some(issuer_cert.subject_name()),
        key,
        &build_name(subject),
        next_serial(),
        &Validity::current(),
        false,
        extensions,
    )
}

pub fn issue_expired_leaf(ca: &CertAuthority, key: &PKeyRef<Private>) -> X509 {
    issue(
        &ca.key,
        Some(ca.cert.subject_name()),
        key,
        &build_name(&[("CN", "Expired Leaf")]),
        next_serial(),
        &Validity::expired(),
        false,
        Vec::new(),
    )
}

/// A self signed EC P-256 root.
pub struct CertAuthority {
    pub key: PKey<Private>,
    pub cert: X509,
}

impl CertAuthority {
    pub fn new() -> Self {
        let key = ec_key();
        let serial = next_serial();
        // The serial keeps subject names unique, so that chains never cross
        // between authorities.
        let cn = format!("Fixture Root CA {}", serial);
        let name = build_name(&[("C", "AU"), ("O", "Webauthn Verifier"), ("CN", &cn)]);
        let cert = issue(
            &key,
            None,
            &key,
            &name,
            serial,
            &Validity::current(),
            true,
            Vec::new(),
        );
        CertAuthority { key, cert }
    }

    pub fn issue_intermediate(&self) -> (PKey<Private>, X509) {
        let key = ec_key();
        let serial = next_serial();
        let cn = format!("Fixture Intermediate CA {}", serial);
        let cert = issue(
            &self.key,
            Some(self.cert.subject_name()),
            &key,
            &build_name(&[("C", "AU"), ("O", "Webauthn Verifier"), ("CN", &cn)]),
            serial,
            &Validity::current(),
            true,
            Vec::new(),
        );
        (key, cert)
    }

    pub fn issue_leaf(
        &self,
        key: &PKeyRef<Private>,
        subject: &[(&str, &str)],
        extensions: Vec<X509Extension>,
    ) -> X509 {
        issue_leaf_from(&self.key, &self.cert, key, subject, extensions)
    }

    /// A leaf meeting the packed attestation certificate requirements.
    pub fn issue_packed_leaf(&self, key: &PKeyRef<Private>, aaguid: Option<Aaguid>) -> X509 {
        let mut extensions = vec![BasicConstraints::new().build().unwrap()];
        if let Some(aaguid) = aaguid {
            extensions.push(aaguid_extension(&aaguid, false));
        }
        self.issue_leaf(
            key,
            &[
                ("C", "US"),
                ("O", "Vendor"),
                ("OU", PACKED_SUBJECT_OU),
                ("CN", "Packed Leaf"),
            ],
            extensions,
        )
    }

    /// A TPM AIK certificate: empty subject, critical SAN and the AIK EKU.
    pub fn issue_tpm_aik(&self, key: &PKeyRef<Private>, aaguid: &Aaguid) -> X509 {
        let extensions = vec![
            BasicConstraints::new().build().unwrap(),
            ExtendedKeyUsage::new()
                .other(TCG_KP_AIK_CERTIFICATE)
                .build()
                .unwrap(),
            tpm_san_extension(),
            aaguid_extension(aaguid, false),
        ];
        issue_leaf_from(&self.key, &self.cert, key, &[], extensions)
    }

    pub fn issue_leaf_with_crl_dp(&self, key: &PKeyRef<Private>, serial: u32) -> X509 {
        issue(
            &self.key,
            Some(self.cert.subject_name()),
            key,
            &build_name(&[("CN", "Revocable Leaf")]),
            serial,
            &Validity::current(),
            false,
            vec![crl_dp_extension(CRL_URI)],
        )
    }

    /// A v2 CRL signed by this authority, listing `revoked` serials.
    pub fn crl_der(&self, revoked: &[u32]) -> Vec<u8> {
        // ecdsa-with-SHA256
        let alg = hex_literal::hex!("300a06082a8648ce3d040302");
        let this_update = der(0x17, b"240101000000Z");
        let next_update = der(0x17, b"491231235959Z");

        let mut tbs = der_uint(1);
        tbs.extend_from_slice(&alg);
        tbs.extend(self.cert.subject_name().to_der().unwrap());
        tbs.extend_from_slice(&this_update);
        tbs.extend(next_update);
        if !revoked.is_empty() {
            let entries: Vec<u8> = revoked
                .iter()
                .flat_map(|s| {
                    let mut e = der_uint(*s);
                    e.extend_from_slice(&this_update);
                    der(0x30, &e)
                })
                .collect();
            tbs.extend(der(0x30, &entries));
        }
        let tbs = der(0x30, &tbs);

        let mut signer = Signer::new(MessageDigest::sha256(), &self.key).unwrap();
        signer.update(&tbs).unwrap();
        let mut sig = vec![0x00];
        sig.extend(signer.sign_to_vec().unwrap());

        let mut crl = tbs;
        crl.extend_from_slice(&alg);
        crl.extend(der(0x03, &sig));
        der(0x30, &crl)
    }

    pub fn crl_pem(&self, revoked: &[u32]) -> Vec<u8> {
        let b64 = base64::encode(self.crl_der(revoked));
        let mut pem = String::from("-----BEGIN X509 CRL-----\n");
        for line in b64.as_bytes().chunks(64) {
            pem.push_str(std::str::from_utf8(line).unwrap());
            pem.push('\n');
        }
        pem.push_str("-----END X509 CRL-----\n");
        pem.into_bytes()
    }
}

// CBOR statements

pub fn cbor_map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::Text(k.to_string()), v))
            .collect(),
    )
}

pub fn x5c_value(certs: &[&X509]) -> Value {
    Value::Array(
        certs
            .iter()
            .map(|c| Value::Bytes(c.to_der().unwrap()))
            .collect(),
    )
}

pub fn with_field(stmt: &Value, key: &str, value: Value) -> Value {
    match stmt {
        Value::Map(m) => {
            let mut m = m.clone();
            m.insert(Value::Text(key.to_string()), value);
            Value::Map(m)
        }
        _ => panic!("statement is not a map"),
    }
}

/// Flip the last byte of `sig`.
pub fn corrupt_sig(stmt: &Value) -> Value {
    let sig = match stmt {
        Value::Map(m) => match m.get(&Value::Text("sig".to_string())) {
            Some(Value::Bytes(b)) => b.clone(),
            _ => panic!("statement has no sig"),
        },
        _ => panic!("statement is not a map"),
    };
    let mut sig = sig;
    let last = sig.len() - 1;
    sig[last] ^= 0x01;
    with_field(stmt, "sig", Value::Bytes(sig))
}

// Authenticator data and client data

pub fn client_data_json(type_: &str, challenge: &[u8], origin: &str) -> serde_json::Value {
    serde_json::json!({
        "type": type_,
        "challenge": b64url(challenge),
        "origin": origin,
    })
}

pub fn auth_data_bytes(
    rp_id_hash: &[u8],
    flags: u8,
    counter: u32,
    acd: Option<(&Aaguid, &[u8], &Value)>,
    extensions: Option<&Value>,
) -> Vec<u8> {
    let mut out = rp_id_hash.to_vec();
    out.push(flags);
    out.extend_from_slice(&counter.to_be_bytes());
    if let Some((aaguid, credential_id, cose)) = acd {
        out.extend_from_slice(aaguid);
        out.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(credential_id);
        out.extend(serde_cbor_2::to_vec(cose).unwrap());
    }
    if let Some(extensions) = extensions {
        out.extend(serde_cbor_2::to_vec(extensions).unwrap());
    }
    out
}

/// Tunable inputs of a registration [Fixture].
pub struct FixtureOptions {
    pub client_data: serde_json::Value,
    pub rp_id: String,
    pub flags: u8,
    pub counter: u32,
    pub aaguid: Aaguid,
    pub extensions: Option<Value>,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        FixtureOptions {
            client_data: client_data_json(CLIENT_DATA_TYPE_CREATE, &CHALLENGE, ORIGIN),
            rp_id: RP_ID.to_string(),
            flags: FLAG_USER_PRESENT | FLAG_USER_VERIFIED | FLAG_ATTESTED_CREDENTIAL_DATA,
            counter: 0,
            aaguid: AAGUID,
            extensions: None,
        }
    }
}

/// A credential key with the authenticator data and client data of its
/// registration.
pub struct Fixture {
    pub key: PKey<Private>,
    pub alg: COSEAlgorithm,
    pub aaguid: Aaguid,
    pub credential_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub client_data_hash: Vec<u8>,
    pub auth_data_bytes: Vec<u8>,
    pub auth_data: AuthenticatorData,
    pub cpk: CredentialPublicKey,
}

impl Fixture {
    pub fn new(key: PKey<Private>, alg: COSEAlgorithm) -> Self {
        Self::with_options(key, alg, FixtureOptions::default())
    }

    pub fn with_options(key: PKey<Private>, alg: COSEAlgorithm, opts: FixtureOptions) -> Self {
        let cose = cose_value(&key, alg);
        let cpk = CredentialPublicKey::try_from(&cose).unwrap();
        let client_data_json = serde_json::to_vec(&opts.client_data).unwrap();
        let client_data_hash = compute_sha256(&client_data_json).to_vec();
        let credential_id = CREDENTIAL_ID.to_vec();

        let flags = opts.flags
            | if opts.extensions.is_some() {
                FLAG_EXTENSION_DATA
            } else {
                0
            };
        let acd = if flags & FLAG_ATTESTED_CREDENTIAL_DATA != 0 {
            Some((&opts.aaguid, credential_id.as_slice(), &cose))
        } else {
            None
        };
        let auth_data_bytes = auth_data_bytes(
            &compute_sha256(opts.rp_id.as_bytes()),
            flags,
            opts.counter,
            acd,
            opts.extensions.as_ref(),
        );
        let auth_data = AuthenticatorData::try_from(auth_data_bytes.as_slice()).unwrap();

        Fixture {
            key,
            alg,
            aaguid: opts.aaguid,
            credential_id,
            client_data_json,
            client_data_hash,
            auth_data_bytes,
            auth_data,
            cpk,
        }
    }

    /// authenticatorData || clientDataHash
    pub fn signed_data(&self) -> Vec<u8> {
        let mut d = self.auth_data_bytes.clone();
        d.extend_from_slice(&self.client_data_hash);
        d
    }

    pub fn sign_self(&self, data: &[u8]) -> Vec<u8> {
        sign(self.alg, &self.key, data)
    }

    pub fn context<'a>(&'a self, roots: &'a [X509]) -> VerificationContext<'a> {
        VerificationContext {
            auth_data_bytes: Some(&self.auth_data_bytes),
            auth_data: Some(&self.auth_data),
            client_data_hash: Some(&self.client_data_hash),
            credential_public_key: Some(&self.cpk),
            roots,
            chain: CertificateChainValidator::new(None, false),
        }
    }

    pub fn packed_self_statement(&self) -> Value {
        cbor_map(vec![
            ("alg", Value::Integer(self.alg as i32 as i128)),
            ("sig", Value::Bytes(self.sign_self(&self.signed_data()))),
        ])
    }

    pub fn x5c_statement(
        &self,
        att_key: &PKeyRef<Private>,
        alg: COSEAlgorithm,
        certs: &[&X509],
    ) -> Value {
        cbor_map(vec![
            ("alg", Value::Integer(alg as i32 as i128)),
            ("sig", Value::Bytes(sign(alg, att_key, &self.signed_data()))),
            ("x5c", x5c_value(certs)),
        ])
    }

    pub fn fido_u2f_statement(&self, att_key: &PKeyRef<Private>, cert: &X509) -> Value {
        let public_key_u2f = self.cpk.cose.get_alg_key_ecc_x962_raw().unwrap_or_default();
        let mut data = vec![0x00];
        data.extend_from_slice(&self.auth_data.rp_id_hash);
        data.extend_from_slice(&self.client_data_hash);
        data.extend_from_slice(&self.credential_id);
        data.extend(public_key_u2f);
        cbor_map(vec![
            ("sig", Value::Bytes(sign(COSEAlgorithm::ES256, att_key, &data))),
            ("x5c", x5c_value(&[cert])),
        ])
    }

    pub fn attestation_object(&self, fmt: &str, att_stmt: Value) -> Vec<u8> {
        let obj = cbor_map(vec![
            ("fmt", Value::Text(fmt.to_string())),
            ("attStmt", att_stmt),
            ("authData", Value::Bytes(self.auth_data_bytes.clone())),
        ]);
        serde_cbor_2::to_vec(&obj).unwrap()
    }

    pub fn register_credential(&self, fmt: &str, att_stmt: Value) -> RegisterPublicKeyCredential {
        RegisterPublicKeyCredential {
            id: b64url(&self.credential_id),
            raw_id: Some(Base64UrlSafeData(self.credential_id.clone())),
            response: AuthenticatorAttestationResponseRaw {
                attestation_object: Base64UrlSafeData(self.attestation_object(fmt, att_stmt)),
                client_data_json: Base64UrlSafeData(self.client_data_json.clone()),
                transports: None,
            },
            type_: CREDENTIAL_TYPE_PUBLIC_KEY.to_string(),
            extensions: ClientExtensionResults::default(),
        }
    }
}

pub fn empty_context(chain: CertificateChainValidator<'_>) -> VerificationContext<'_> {
    VerificationContext {
        auth_data_bytes: None,
        auth_data: None,
        client_data_hash: None,
        credential_public_key: None,
        roots: &[],
        chain,
    }
}

// TPM

/// A TPMT_PUBLIC describing `cpk`.
pub fn tpm_pub_area(cpk: &CredentialPublicKey, name_alg: u16) -> Vec<u8> {
    let mut p = Vec::new();
    match &cpk.cose.key {
        COSEKeyType::RSA(rsa) => {
            p.extend_from_slice(&TPM_ALG_RSA.to_be_bytes());
            p.extend_from_slice(&name_alg.to_be_bytes());
            p.extend_from_slice(&0x0006_0472u32.to_be_bytes());
            p.extend_from_slice(&[0, 0]);
            p.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
            p.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
            p.extend_from_slice(&((rsa.n.len() * 8) as u16).to_be_bytes());
            p.extend_from_slice(&0u32.to_be_bytes());
            p.extend_from_slice(&(rsa.n.len() as u16).to_be_bytes());
            p.extend_from_slice(&rsa.n);
        }
        COSEKeyType::EC_EC2(ec) => {
            let curve = match ec.curve {
                ECDSACurve::SECP256R1 => TPM_ECC_NIST_P256,
                ECDSACurve::SECP384R1 => TPM_ECC_NIST_P384,
                ECDSACurve::SECP521R1 => TPM_ECC_NIST_P521,
            };
            p.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
            p.extend_from_slice(&name_alg.to_be_bytes());
            p.extend_from_slice(&0x0006_0472u32.to_be_bytes());
            p.extend_from_slice(&[0, 0]);
            p.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
            p.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
            p.extend_from_slice(&curve.to_be_bytes());
            p.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
            p.extend_from_slice(&(ec.x.len() as u16).to_be_bytes());
            p.extend_from_slice(&ec.x);
            p.extend_from_slice(&(ec.y.len() as u16).to_be_bytes());
            p.extend_from_slice(&ec.y);
        }
        other => panic!("no tpm representation for {:?}", other),
    }
    p
}

fn tpm_name_of(name_alg: u16, pub_area: &[u8]) -> Vec<u8> {
    let md = match name_alg {
        TPM_ALG_SHA1 => MessageDigest::sha1(),
        TPM_ALG_SHA256 => MessageDigest::sha256(),
        TPM_ALG_SHA384 => MessageDigest::sha384(),
        TPM_ALG_SHA512 => MessageDigest::sha512(),
        other => panic!("unexpected nameAlg {}", other),
    };
    let mut name = name_alg.to_be_bytes().to_vec();
    name.extend_from_slice(&hash::hash(md, pub_area).unwrap());
    name
}

fn push_tpm2b(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

/// A TPMS_ATTEST of type TPM_ST_ATTEST_CERTIFY.
pub fn tpm_cert_info(extra_data: &[u8], name: &[u8]) -> Vec<u8> {
    let mut c = Vec::new();
    c.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
    c.extend_from_slice(&TPM_ST_ATTEST_CERTIFY.to_be_bytes());
    // qualifiedSigner
    push_tpm2b(&mut c, &[]);
    push_tpm2b(&mut c, extra_data);
    // clockInfo
    c.extend_from_slice(&42u64.to_be_bytes());
    c.extend_from_slice(&1u32.to_be_bytes());
    c.extend_from_slice(&0u32.to_be_bytes());
    c.push(1);
    c.extend_from_slice(&TPM_FIRMWARE_VERSION.to_be_bytes());
    // attested: name, qualifiedName
    push_tpm2b(&mut c, name);
    push_tpm2b(&mut c, name);
    c
}

/// A TPM with an RSA AIK issued by a [CertAuthority].
pub struct TpmFixture {
    pub aik_key: PKey<Private>,
    pub aik_cert: X509,
    pub name_alg: u16,
}

impl TpmFixture {
    pub fn new(ca: &CertAuthority, f: &Fixture, name_alg: u16) -> Self {
        let aik_key = rsa_key();
        let aik_cert = ca.issue_tpm_aik(&aik_key, &f.aaguid);
        TpmFixture {
            aik_key,
            aik_cert,
            name_alg,
        }
    }

    pub fn statement(&self, f: &Fixture) -> Value {
        self.statement_with_extra_data(f, &compute_sha256(&f.signed_data()))
    }

    pub fn statement_with_extra_data(&self, f: &Fixture, extra_data: &[u8]) -> Value {
        let pub_area = tpm_pub_area(&f.cpk, self.name_alg);
        let cert_info = tpm_cert_info(extra_data, &tpm_name_of(self.name_alg, &pub_area));
        let sig = sign(COSEAlgorithm::RS256, &self.aik_key, &cert_info);
        cbor_map(vec![
            ("ver", Value::Text("2.0".to_string())),
            ("alg", Value::Integer(COSEAlgorithm::RS256 as i32 as i128)),
            ("x5c", x5c_value(&[&self.aik_cert])),
            ("sig", Value::Bytes(sig)),
            ("certInfo", Value::Bytes(cert_info)),
            ("pubArea", Value::Bytes(pub_area)),
        ])
    }
}

// SafetyNet

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetClaims {
    pub timestamp_ms: u64,
    pub nonce: String,
    pub apk_package_name: String,
    pub apk_certificate_digest_sha256: Vec<String>,
    pub cts_profile_match: bool,
    pub basic_integrity: bool,
    pub evaluation_type: Option<String>,
}

impl SafetyNetClaims {
    pub fn valid(f: &Fixture) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        SafetyNetClaims {
            timestamp_ms: now,
            nonce: base64::encode(compute_sha256(&f.signed_data())),
            apk_package_name: "com.google.android.gms".to_string(),
            apk_certificate_digest_sha256: vec![base64::encode([0x38u8; 32])],
            cts_profile_match: true,
            basic_integrity: true,
            evaluation_type: Some("BASIC".to_string()),
        }
    }
}

/// A SafetyNet attestation statement whose JWS is signed by `key` under `alg`.
pub fn safetynet_statement(
    alg: &str,
    key: &PKeyRef<Private>,
    certs: &[&X509],
    claims: &SafetyNetClaims,
) -> Value {
    let header = serde_json::json!({
        "alg": alg,
        "x5c": certs
            .iter()
            .map(|c| base64::encode(c.to_der().unwrap()))
            .collect::<Vec<_>>(),
    });
    let signing_input = format!(
        "{}.{}",
        b64url(&serde_json::to_vec(&header).unwrap()),
        b64url(&serde_json::to_vec(claims).unwrap())
    );

    let sig = match alg {
        "RS256" => sign(COSEAlgorithm::RS256, key, signing_input.as_bytes()),
        "ES256" => {
            let der_sig = sign(COSEAlgorithm::ES256, key, signing_input.as_bytes());
            let sig = EcdsaSig::from_der(&der_sig).unwrap();
            let mut raw = sig.r().to_vec_padded(32).unwrap();
            raw.extend(sig.s().to_vec_padded(32).unwrap());
            raw
        }
        other => panic!("unsupported jws alg {}", other),
    };
    let token = format!("{}.{}", signing_input, b64url(&sig));

    cbor_map(vec![
        ("ver", Value::Text("14799021".to_string())),
        ("response", Value::Bytes(token.into_bytes())),
    ])
}

// Assertions

/// Tunable inputs of an assertion response.
pub struct AssertionInput {
    pub client_data: serde_json::Value,
    pub rp_id: String,
    pub flags: u8,
    pub counter: u32,
    pub credential_id: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub extensions: ClientExtensionResults,
    /// COSE key embedded as attested credential data, setting the AT flag.
    pub attested_key: Option<Value>,
    /// CBOR map appended as authenticator extensions, setting the ED flag.
    pub authenticator_extensions: Option<Value>,
}

impl Default for AssertionInput {
    fn default() -> Self {
        AssertionInput {
            client_data: client_data_json(CLIENT_DATA_TYPE_GET, &CHALLENGE, ORIGIN),
            rp_id: RP_ID.to_string(),
            flags: FLAG_USER_PRESENT | FLAG_USER_VERIFIED,
            counter: 100,
            credential_id: CREDENTIAL_ID.to_vec(),
            user_handle: None,
            extensions: ClientExtensionResults::default(),
            attested_key: None,
            authenticator_extensions: None,
        }
    }
}

impl AssertionInput {
    /// Produce a credential signed by `key`.
    pub fn sign(&self, alg: COSEAlgorithm, key: &PKeyRef<Private>) -> PublicKeyCredential {
        let mut flags = self.flags;
        if self.attested_key.is_some() {
            flags |= FLAG_ATTESTED_CREDENTIAL_DATA;
        }
        if self.authenticator_extensions.is_some() {
            flags |= FLAG_EXTENSION_DATA;
        }
        let auth_data = auth_data_bytes(
            &compute_sha256(self.rp_id.as_bytes()),
            flags,
            self.counter,
            self.attested_key
                .as_ref()
                .map(|cose| (&AAGUID, self.credential_id.as_slice(), cose)),
            self.authenticator_extensions.as_ref(),
        );
        let client_data_json = serde_json::to_vec(&self.client_data).unwrap();
        let mut signed = auth_data.clone();
        signed.extend_from_slice(&compute_sha256(&client_data_json));

        PublicKeyCredential {
            id: b64url(&self.credential_id),
            raw_id: Some(Base64UrlSafeData(self.credential_id.clone())),
            response: AuthenticatorAssertionResponseRaw {
                authenticator_data: Base64UrlSafeData(auth_data),
                client_data_json: Base64UrlSafeData(client_data_json),
                signature: Base64UrlSafeData(sign(alg, key, &signed)),
                user_handle: self.user_handle.clone().map(Base64UrlSafeData),
            },
            extensions: self.extensions.clone(),
            type_: CREDENTIAL_TYPE_PUBLIC_KEY.to_string(),
        }
    }
}
