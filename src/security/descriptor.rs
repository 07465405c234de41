//! The document's encryption dictionary

use std::sync::OnceLock;

use log::debug;

use super::crypt_filter::{CryptFilterMethod, CryptFilterTable};
use super::permissions::PermissionSet;
use crate::error::{PdfSecurityError, PdfSecurityResult};
use crate::pdf::{Dictionary, Value};

/// Size of /O and /U up to revision 4
const LEGACY_VERIFIER_LEN: usize = 32;
/// Size of /O and /U for revision 5
const SHA_VERIFIER_LEN: usize = 48;
/// Size of /OE and /UE
const ENCRYPTED_KEY_LEN: usize = 32;
/// Size of /Perms
const PERMS_LEN: usize = 16;

/// Immutable view of an /Encrypt dictionary plus the first /ID element.
#[derive(Debug, Clone)]
pub struct EncryptionDescriptor {
    filter: String,
    sub_filter: Option<String>,
    version: u32,
    revision: u32,
    /// Key length in bits (/Length)
    length: u32,
    owner_verifier: Vec<u8>,
    user_verifier: Vec<u8>,
    owner_encrypted_key: Option<Vec<u8>>,
    user_encrypted_key: Option<Vec<u8>>,
    perms: Option<Vec<u8>>,
    permissions: i32,
    encrypt_metadata: bool,
    crypt_filter_dict: Option<Dictionary>,
    stream_filter: String,
    string_filter: String,
    embedded_file_filter: Option<String>,
    file_id: Vec<u8>,
    crypt_filters: OnceLock<CryptFilterTable>,
}

impl EncryptionDescriptor {
    /// Parse and validate an encryption dictionary.
    pub fn from_dictionary(dict: &Dictionary, file_id: &[u8]) -> PdfSecurityResult<Self> {
        let filter = dict
            .get_name("Filter")
            .ok_or_else(|| PdfSecurityError::MissingDictionaryEntry("Filter".to_string()))?
            .to_string();

        let sub_filter = dict.get_name("SubFilter").map(str::to_string);

        let version = match dict.get("V") {
            Some(value) => non_negative("V", value)?,
            None => 0,
        };

        let revision = dict
            .get("R")
            .ok_or_else(|| PdfSecurityError::MissingDictionaryEntry("R".to_string()))
            .and_then(|value| non_negative("R", value))?;

        let length = match dict.get("Length") {
            Some(value) => non_negative("Length", value)?,
            None => 40,
        };

        let owner_verifier = required_bytes(dict, "O")?;
        let user_verifier = required_bytes(dict, "U")?;

        let permissions = match dict.get("P") {
            // Producers write P signed or as its unsigned 32-bit image
            Some(Value::Integer(p)) => *p as i32,
            Some(other) => {
                return Err(PdfSecurityError::invalid_dict_value(
                    "P",
                    format!("expected integer, found {}", other.type_name()),
                ))
            }
            None => return Err(PdfSecurityError::MissingDictionaryEntry("P".to_string())),
        };

        let encrypt_metadata = match dict.get("EncryptMetadata") {
            Some(value) => value.as_bool().ok_or_else(|| {
                PdfSecurityError::invalid_dict_value("EncryptMetadata", "expected boolean")
            })?,
            None => true,
        };

        let crypt_filter_dict = match dict.get("CF") {
            Some(value) => Some(
                value
                    .as_dict()
                    .ok_or_else(|| PdfSecurityError::invalid_dict_value("CF", "expected dictionary"))?
                    .clone(),
            ),
            None => None,
        };

        let descriptor = Self {
            filter,
            sub_filter,
            version,
            revision,
            length: normalize_length(version, length),
            owner_verifier,
            user_verifier,
            owner_encrypted_key: dict.get_bytes("OE").map(<[u8]>::to_vec),
            user_encrypted_key: dict.get_bytes("UE").map(<[u8]>::to_vec),
            perms: dict.get_bytes("Perms").map(<[u8]>::to_vec),
            permissions,
            encrypt_metadata,
            crypt_filter_dict,
            stream_filter: dict
                .get_name("StmF")
                .unwrap_or(CryptFilterTable::IDENTITY)
                .to_string(),
            string_filter: dict
                .get_name("StrF")
                .unwrap_or(CryptFilterTable::IDENTITY)
                .to_string(),
            embedded_file_filter: dict.get_name("EFF").map(str::to_string),
            file_id: file_id.to_vec(),
            crypt_filters: OnceLock::new(),
        }
        .truncate_verifiers();

        debug!(
            "Encryption dictionary: Filter={} V={} R={} Length={} P={} ID={}",
            descriptor.filter,
            descriptor.version,
            descriptor.revision,
            descriptor.length,
            descriptor.permissions,
            hex::encode(&descriptor.file_id)
        );

        descriptor.validate()?;
        Ok(descriptor)
    }

    /// A standard-handler descriptor without verifiers, for building documents
    /// and fixtures. Version 4 and 5 get a `StdCF` filter (AESV2 and AESV3)
    /// used for strings and streams.
    pub fn standard(version: u32, revision: u32, length: u32, permissions: i32, file_id: &[u8]) -> Self {
        let (crypt_filter_dict, stream_filter) = match version {
            4 | 5 => {
                let (cfm, bits) = if version == 4 {
                    (CryptFilterMethod::AesV2, 128)
                } else {
                    (CryptFilterMethod::AesV3, 256)
                };
                let std_cf = Dictionary::new()
                    .with("CFM", Value::name(cfm.pdf_name()))
                    .with("AuthEvent", Value::name("DocOpen"))
                    .with("Length", Value::Integer(bits));
                (
                    Some(Dictionary::new().with(CryptFilterTable::STD_CF, std_cf)),
                    CryptFilterTable::STD_CF,
                )
            }
            _ => (None, CryptFilterTable::IDENTITY),
        };

        Self {
            filter: "Standard".to_string(),
            sub_filter: None,
            version,
            revision,
            length: normalize_length(version, length),
            owner_verifier: Vec::new(),
            user_verifier: Vec::new(),
            owner_encrypted_key: None,
            user_encrypted_key: None,
            perms: None,
            permissions,
            encrypt_metadata: true,
            crypt_filter_dict,
            stream_filter: stream_filter.to_string(),
            string_filter: stream_filter.to_string(),
            embedded_file_filter: None,
            file_id: file_id.to_vec(),
            crypt_filters: OnceLock::new(),
        }
    }

    pub fn with_owner_verifier(mut self, o: impl Into<Vec<u8>>) -> Self {
        self.owner_verifier = o.into();
        self.truncate_verifiers()
    }

    pub fn with_user_verifier(mut self, u: impl Into<Vec<u8>>) -> Self {
        self.user_verifier = u.into();
        self.truncate_verifiers()
    }

    /// Set /OE and /UE
    pub fn with_encrypted_keys(mut self, oe: impl Into<Vec<u8>>, ue: impl Into<Vec<u8>>) -> Self {
        self.owner_encrypted_key = Some(oe.into());
        self.user_encrypted_key = Some(ue.into());
        self
    }

    pub fn with_perms(mut self, perms: impl Into<Vec<u8>>) -> Self {
        self.perms = Some(perms.into());
        self
    }

    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    /// Replace /CF
    pub fn with_crypt_filters(mut self, cf: Dictionary) -> Self {
        self.crypt_filter_dict = Some(cf);
        self.crypt_filters = OnceLock::new();
        self
    }

    pub fn with_stream_filter(mut self, name: impl Into<String>) -> Self {
        self.stream_filter = name.into();
        self
    }

    pub fn with_string_filter(mut self, name: impl Into<String>) -> Self {
        self.string_filter = name.into();
        self
    }

    pub fn with_embedded_file_filter(mut self, name: impl Into<String>) -> Self {
        self.embedded_file_filter = Some(name.into());
        self
    }

    fn truncate_verifiers(mut self) -> Self {
        let len = self.verifier_len();
        self.owner_verifier.truncate(len);
        self.user_verifier.truncate(len);
        self
    }

    fn verifier_len(&self) -> usize {
        if self.revision >= 5 {
            SHA_VERIFIER_LEN
        } else {
            LEGACY_VERIFIER_LEN
        }
    }

    /// Check that this crate can handle the descriptor.
    pub fn validate(&self) -> PdfSecurityResult<()> {
        match self.version {
            1 | 2 | 4 | 5 => {}
            0 => return Err(PdfSecurityError::unsupported("V=0 (undocumented algorithm)")),
            3 => return Err(PdfSecurityError::unsupported("V=3 (unpublished algorithm)")),
            v => return Err(PdfSecurityError::unsupported(format!("V={}", v))),
        }

        match self.revision {
            2..=5 => {}
            6 => return Err(PdfSecurityError::unsupported("R=6 (PDF 2.0 hardened hash)")),
            r => return Err(PdfSecurityError::unsupported(format!("R={}", r))),
        }

        if (self.version == 5) != (self.revision == 5) {
            return Err(PdfSecurityError::malformed(format!(
                "V={} cannot be combined with R={}",
                self.version, self.revision
            )));
        }

        if matches!(self.version, 1 | 2) && (self.length < 40 || self.length > 128 || self.length % 8 != 0) {
            return Err(PdfSecurityError::invalid_dict_value(
                "Length",
                format!("{} bits is not a valid RC4 key length", self.length),
            ));
        }

        let expected = self.verifier_len();
        for (key, value) in [("O", &self.owner_verifier), ("U", &self.user_verifier)] {
            if value.len() != expected {
                return Err(PdfSecurityError::malformed(format!(
                    "/{} is {} bytes, expected {}",
                    key,
                    value.len(),
                    expected
                )));
            }
        }

        if self.revision >= 5 {
            for (key, value, len) in [
                ("OE", &self.owner_encrypted_key, ENCRYPTED_KEY_LEN),
                ("UE", &self.user_encrypted_key, ENCRYPTED_KEY_LEN),
                ("Perms", &self.perms, PERMS_LEN),
            ] {
                match value {
                    None => return Err(PdfSecurityError::MissingDictionaryEntry(key.to_string())),
                    Some(bytes) if bytes.len() < len => {
                        return Err(PdfSecurityError::malformed(format!(
                            "/{} is {} bytes, expected {}",
                            key,
                            bytes.len(),
                            len
                        )))
                    }
                    Some(_) => {}
                }
            }
        } else if self.file_id.is_empty() {
            return Err(PdfSecurityError::MissingDictionaryEntry("ID".to_string()));
        }

        if self.uses_crypt_filters() {
            let names = [
                ("StmF", self.stream_filter.as_str()),
                ("StrF", self.string_filter.as_str()),
                ("EFF", self.embedded_file_filter()),
            ];
            for (key, name) in names {
                let filter = self.crypt_filters().lookup(name).map_err(|err| match err {
                    PdfSecurityError::UnknownCryptFilter(name) => PdfSecurityError::malformed(
                        format!("/{} names undefined crypt filter {}", key, name),
                    ),
                    other => other,
                })?;
                // AESV3 needs the 32-byte file key only V=5 derives
                if filter.method == CryptFilterMethod::AesV3 && self.version != 5 {
                    return Err(PdfSecurityError::unsupported(format!(
                        "/{} crypt filter {} uses AESV3 with V={}",
                        key, name, self.version
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn sub_filter(&self) -> Option<&str> {
        self.sub_filter.as_deref()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// /Length in bits
    pub fn length(&self) -> u32 {
        self.length
    }

    /// File key length in bytes
    pub fn key_length(&self) -> usize {
        match (self.version, self.revision) {
            (_, 2) => 5,
            (5, _) => 32,
            (4, _) => {
                // Governed by the crypt filter that actually encrypts
                [self.stream_filter.as_str(), self.string_filter.as_str()]
                    .into_iter()
                    .filter_map(|name| self.crypt_filters().get(name))
                    .find(|filter| filter.method != CryptFilterMethod::None)
                    .map(|filter| filter.key_length.min(16))
                    .unwrap_or(16)
            }
            _ => (self.length / 8) as usize,
        }
    }

    /// /O
    pub fn owner_verifier(&self) -> &[u8] {
        &self.owner_verifier
    }

    /// /U
    pub fn user_verifier(&self) -> &[u8] {
        &self.user_verifier
    }

    /// /OE
    pub fn owner_encrypted_key(&self) -> Option<&[u8]> {
        self.owner_encrypted_key.as_deref()
    }

    /// /UE
    pub fn user_encrypted_key(&self) -> Option<&[u8]> {
        self.user_encrypted_key.as_deref()
    }

    pub fn perms(&self) -> Option<&[u8]> {
        self.perms.as_deref()
    }

    /// /P
    pub fn p(&self) -> i32 {
        self.permissions
    }

    pub fn permissions(&self) -> PermissionSet {
        PermissionSet::decode(self.permissions, self.revision)
    }

    pub fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    pub fn file_id(&self) -> &[u8] {
        &self.file_id
    }

    /// Whether strings and streams are routed through crypt filters (V 4 and 5)
    pub fn uses_crypt_filters(&self) -> bool {
        self.version >= 4
    }

    pub fn stream_filter(&self) -> &str {
        &self.stream_filter
    }

    pub fn string_filter(&self) -> &str {
        &self.string_filter
    }

    /// /EFF, defaulting to /StmF
    pub fn embedded_file_filter(&self) -> &str {
        self.embedded_file_filter
            .as_deref()
            .unwrap_or(&self.stream_filter)
    }

    /// /CF, parsed on first use
    pub fn crypt_filters(&self) -> &CryptFilterTable {
        self.crypt_filters.get_or_init(|| {
            let default_key_length = match self.version {
                5 => 32,
                4 => 16,
                _ => (self.length / 8) as usize,
            };
            CryptFilterTable::from_dictionary(self.crypt_filter_dict.as_ref(), default_key_length)
        })
    }
}

fn non_negative(key: &str, value: &Value) -> PdfSecurityResult<u32> {
    let n = value.as_integer().ok_or_else(|| {
        PdfSecurityError::invalid_dict_value(key, format!("expected integer, found {}", value.type_name()))
    })?;
    u32::try_from(n).map_err(|_| PdfSecurityError::invalid_dict_value(key, format!("{} is out of range", n)))
}

fn required_bytes(dict: &Dictionary, key: &str) -> PdfSecurityResult<Vec<u8>> {
    match dict.get(key) {
        Some(value) => value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| PdfSecurityError::invalid_dict_value(key, "expected string")),
        None => Err(PdfSecurityError::MissingDictionaryEntry(key.to_string())),
    }
}

/// V=1 is always 40-bit; some producers write /Length in bytes.
fn normalize_length(version: u32, length: u32) -> u32 {
    match (version, length) {
        (1, _) => 40,
        (_, 5..=16) => length * 8,
        _ => length,
    }
}
