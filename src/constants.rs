// Can this ever change?
pub const CHALLENGE_MIN_BYTES: usize = 16;

pub const CLIENT_DATA_TYPE_CREATE: &str = "webauthn.create";
pub const CLIENT_DATA_TYPE_GET: &str = "webauthn.get";
pub const CREDENTIAL_TYPE_PUBLIC_KEY: &str = "public-key";

// authenticatorData flag bits
pub const FLAG_USER_PRESENT: u8 = 1 << 0;
pub const FLAG_USER_VERIFIED: u8 = 1 << 2;
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 1 << 6;
pub const FLAG_EXTENSION_DATA: u8 = 1 << 7;

pub const SAFETYNET_MAX_AGE_MS: u128 = 60_000;
pub const SAFETYNET_HOSTNAME: &str = "attest.android.com";

pub const PACKED_SUBJECT_OU: &str = "Authenticator Attestation";

// TPM 2.0 Part 2 constants
pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_SHA1: u16 = 0x0004;
pub const TPM_ALG_SHA256: u16 = 0x000b;
pub const TPM_ALG_SHA384: u16 = 0x000c;
pub const TPM_ALG_SHA512: u16 = 0x000d;
pub const TPM_ALG_NULL: u16 = 0x0010;
pub const TPM_ALG_ECC: u16 = 0x0023;

pub const TPM_ECC_NIST_P256: u16 = 0x0003;
pub const TPM_ECC_NIST_P384: u16 = 0x0004;
pub const TPM_ECC_NIST_P521: u16 = 0x0005;

// An exponent of zero in TPMS_RSA_PARMS means the default of 2^16 + 1.
pub const TPM_RSA_DEFAULT_EXPONENT: u32 = 65537;

// tcg-kp-AIKCertificate
pub const TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";
pub const TCG_AT_TPM_MANUFACTURER: &str = "2.23.133.2.1";
pub const TCG_AT_TPM_MODEL: &str = "2.23.133.2.2";
pub const TCG_AT_TPM_VERSION: &str = "2.23.133.2.3";
