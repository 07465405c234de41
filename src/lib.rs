//! PDF Standard Security Handler for Rust
//!
//! Opens password-protected PDF documents: parses the trailer's encryption
//! dictionary, authenticates a user or owner password, decodes the
//! permission flags and decrypts (or encrypts) the strings and streams of
//! individual objects. Revisions 2 to 5 are supported, with RC4, AES-128 and
//! AES-256 ciphers.
//!
//! ```
//! use pdf_security::{Dictionary, SecurityManager, SecurityOptions, Value};
//!
//! let dict = Dictionary::new()
//!     .with("Filter", Value::name("Standard"))
//!     .with("V", Value::Integer(2))
//!     .with("R", Value::Integer(3))
//!     .with("Length", Value::Integer(128))
//!     .with("O", Value::bytes(vec![0u8; 32]))
//!     .with("U", Value::bytes(vec![0u8; 32]))
//!     .with("P", Value::Integer(-44));
//!
//! let mut manager = SecurityManager::from_dictionary(&dict, b"ID1", SecurityOptions::default())?;
//! assert!(!manager.authorize("secret"));
//! # Ok::<(), pdf_security::PdfSecurityError>(())
//! ```

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use log::{debug, warn};

mod error;
mod options;

pub mod crypto;
pub mod handlers;
pub mod pdf;
pub mod security;

pub use crypto::{CryptoEngine, FixedIvSource, IvSource, ThreadRngIvSource};
pub use error::{PdfSecurityError, PdfSecurityResult};
pub use handlers::{SecurityHandler, StandardSecurityHandler};
pub use options::SecurityOptions;
pub use pdf::{Dictionary, ObjectRef, Value};
pub use security::{
    AuthenticationState, Capability, CryptFilterMethod, EncryptionDescriptor, PayloadKind,
    PermissionSet,
};

/// Cipher applied to an object payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// No encryption; payload passes through unchanged
    Identity,
    /// RC4 with a per-object key (V1/V2 and the V2 crypt filter)
    Rc4,
    /// AES-128-CBC with a per-object key (AESV2)
    Aes128,
    /// AES-256-CBC with the file key (AESV3)
    Aes256,
}

impl Algorithm {
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Identity => write!(f, "Identity"),
            Algorithm::Rc4 => write!(f, "RC4"),
            Algorithm::Aes128 => write!(f, "AES-128"),
            Algorithm::Aes256 => write!(f, "AES-256"),
        }
    }
}

impl From<CryptFilterMethod> for Algorithm {
    fn from(method: CryptFilterMethod) -> Self {
        match method {
            CryptFilterMethod::None => Algorithm::Identity,
            CryptFilterMethod::V2 => Algorithm::Rc4,
            CryptFilterMethod::AesV2 => Algorithm::Aes128,
            CryptFilterMethod::AesV3 => Algorithm::Aes256,
        }
    }
}

/// Security context of one open document.
///
/// Created when the document is opened and dropped with it. Call
/// [`authorize`](Self::authorize) once; afterwards the manager can be shared
/// between threads and every encrypt/decrypt call takes `&self`.
#[derive(Debug)]
pub struct SecurityManager {
    handler: SecurityHandler,
    options: SecurityOptions,
}

impl SecurityManager {
    /// Build the handler named by the descriptor's /Filter.
    pub fn new(descriptor: EncryptionDescriptor, options: SecurityOptions) -> PdfSecurityResult<Self> {
        let engine = Arc::new(CryptoEngine::with_iv_source(options.iv_source.clone()));
        let mut handler = SecurityHandler::for_descriptor(descriptor, engine)?;
        if options.cache_object_keys {
            handler = handler.with_key_cache(options.max_cached_keys);
        }
        debug!("Security manager ready ({} handler, {:?})", handler.filter_name(), options);
        Ok(Self { handler, options })
    }

    /// Parse the trailer's /Encrypt dictionary and build the manager.
    ///
    /// `file_id` is the first element of the trailer's /ID array.
    pub fn from_dictionary(dict: &Dictionary, file_id: &[u8], options: SecurityOptions) -> PdfSecurityResult<Self> {
        let descriptor = EncryptionDescriptor::from_dictionary(dict, file_id)?;
        Self::new(descriptor, options)
    }

    /// Try a password; `false` means wrong password (or a broken descriptor,
    /// which is logged).
    pub fn authorize(&mut self, password: &str) -> bool {
        self.authorize_bytes(password.as_bytes())
    }

    /// Same as [`authorize`](Self::authorize) for passwords that are not UTF-8.
    pub fn authorize_bytes(&mut self, password: &[u8]) -> bool {
        match self.handler.authorize(password) {
            Ok(granted) => granted,
            Err(err) => {
                warn!("Authorization failed: {}", err);
                false
            }
        }
    }

    pub fn permissions(&self) -> &PermissionSet {
        self.handler.permissions()
    }

    pub fn auth_state(&self) -> AuthenticationState {
        self.handler.state()
    }

    pub fn is_authorized(&self) -> bool {
        self.handler.state().is_authenticated()
    }

    pub fn descriptor(&self) -> &EncryptionDescriptor {
        self.handler.descriptor()
    }

    pub fn options(&self) -> &SecurityOptions {
        &self.options
    }

    pub fn handler(&self) -> &SecurityHandler {
        &self.handler
    }

    /// Encrypt a payload with the document's default filter for `kind`.
    pub fn encrypt(&self, obj: ObjectRef, kind: PayloadKind, data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
        self.handler.encrypt(obj, kind, None, data)
    }

    /// Decrypt a payload with the document's default filter for `kind`.
    pub fn decrypt(&self, obj: ObjectRef, kind: PayloadKind, data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
        self.handler.decrypt(obj, kind, None, data)
    }

    pub fn encrypt_string(&self, obj: ObjectRef, data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
        self.handler.encrypt(obj, PayloadKind::String, None, data)
    }

    pub fn decrypt_string(&self, obj: ObjectRef, data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
        self.handler.decrypt(obj, PayloadKind::String, None, data)
    }

    /// Encrypt a whole stream body. `crypt_filter` is the /Name from the
    /// stream's Crypt decode parameters, if any.
    pub fn encrypt_stream(&self, obj: ObjectRef, crypt_filter: Option<&str>, data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
        self.handler.encrypt(obj, PayloadKind::Stream, crypt_filter, data)
    }

    pub fn decrypt_stream(&self, obj: ObjectRef, crypt_filter: Option<&str>, data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
        self.handler.decrypt(obj, PayloadKind::Stream, crypt_filter, data)
    }

    /// Streaming encrypt; returns the number of bytes written.
    pub fn encrypt_stream_to<R: Read, W: Write>(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut R,
        writer: &mut W,
    ) -> PdfSecurityResult<u64> {
        self.handler.encrypt_stream(obj, kind, crypt_filter, reader, writer)
    }

    /// Streaming decrypt; returns the number of bytes written.
    pub fn decrypt_stream_to<R: Read, W: Write>(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut R,
        writer: &mut W,
    ) -> PdfSecurityResult<u64> {
        self.handler.decrypt_stream(obj, kind, crypt_filter, reader, writer)
    }

    /// Decrypt, degrading per object instead of failing the document.
    ///
    /// A recoverable failure or an empty result yields the input unchanged
    /// when `fallback_to_original` is set, and an empty buffer otherwise.
    /// Errors that are not confined to this payload (not authenticated,
    /// unsupported algorithm) are still returned.
    pub fn decrypt_or_original(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        data: &[u8],
    ) -> PdfSecurityResult<Vec<u8>> {
        match self.handler.decrypt(obj, kind, crypt_filter, data) {
            Ok(plain) if !plain.is_empty() || data.is_empty() => Ok(plain),
            Ok(_) => {
                debug!("Decrypting {} produced nothing", obj);
                Ok(self.fallback(data))
            }
            Err(err) if err.is_recoverable() => {
                warn!("Failed to decrypt {}: {}", obj, err);
                Ok(self.fallback(data))
            }
            Err(err) => Err(err),
        }
    }

    /// Streaming form of [`decrypt_or_original`](Self::decrypt_or_original).
    ///
    /// The plaintext is staged in memory so nothing reaches `writer` unless
    /// decryption succeeds; on fallback the reader is rewound and copied.
    pub fn decrypt_stream_to_or_original<R: Read + Seek, W: Write>(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut R,
        writer: &mut W,
    ) -> PdfSecurityResult<u64> {
        let start = reader.stream_position()?;
        let mut plain = Vec::new();

        let failed = match self.handler.decrypt_stream(obj, kind, crypt_filter, &mut *reader, &mut plain) {
            Ok(written) if written > 0 => {
                writer.write_all(&plain)?;
                return Ok(written);
            }
            Ok(_) => false,
            Err(err) if err.is_recoverable() => {
                warn!("Failed to decrypt stream {}: {}", obj, err);
                true
            }
            Err(err) => return Err(err),
        };

        reader.seek(SeekFrom::Start(start))?;
        if !self.options.fallback_to_original {
            return Ok(0);
        }
        if !failed {
            debug!("Decrypting stream {} produced nothing", obj);
        }
        Ok(io::copy(reader, writer)?)
    }

    /// Forget the password and every derived key.
    pub fn dispose(&mut self) {
        self.handler.dispose();
    }

    fn fallback(&self, data: &[u8]) -> Vec<u8> {
        if self.options.fallback_to_original {
            data.to_vec()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{compute_owner_verifier, compute_user_verifier};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use test_log::test;

    fn descriptor(version: u32, revision: u32, p: i32, user: &[u8], owner: &[u8]) -> EncryptionDescriptor {
        let base = EncryptionDescriptor::standard(version, revision, 128, p, b"ID1");
        let o = compute_owner_verifier(owner, user, revision, base.length()).unwrap();
        let base = base.with_owner_verifier(o);
        let u = compute_user_verifier(user, &base).unwrap();
        base.with_user_verifier(u)
    }

    fn manager(options: SecurityOptions) -> SecurityManager {
        SecurityManager::new(descriptor(4, 4, -4, b"user", b"owner"), options).unwrap()
    }

    #[test]
    fn test_algorithm_from_method() {
        assert_eq!(Algorithm::from(CryptFilterMethod::None), Algorithm::Identity);
        assert_eq!(Algorithm::from(CryptFilterMethod::V2), Algorithm::Rc4);
        assert_eq!(Algorithm::from(CryptFilterMethod::AesV2), Algorithm::Aes128);
        assert_eq!(Algorithm::from(CryptFilterMethod::AesV3), Algorithm::Aes256);
        assert!(Algorithm::Aes256.is_aes());
        assert!(!Algorithm::Rc4.is_aes());
        assert_eq!(Algorithm::Aes128.to_string(), "AES-128");
    }

    #[test]
    fn test_permissions_r2() {
        let manager = SecurityManager::new(descriptor(1, 2, -44, b"", b"owner"), SecurityOptions::default()).unwrap();
        let permissions = manager.permissions();
        assert!(permissions.can_print());
        assert!(permissions.can_extract());
        assert!(!permissions.can_modify());
    }

    #[test]
    fn test_authorize() {
        let mut manager = manager(SecurityOptions::default());
        assert!(!manager.is_authorized());
        assert!(!manager.authorize("wrong"));
        assert_eq!(manager.auth_state(), AuthenticationState::Rejected);
        assert!(manager.authorize("owner"));
        assert_eq!(manager.auth_state(), AuthenticationState::OwnerAuthenticated);
        manager.dispose();
        assert!(!manager.is_authorized());
    }

    #[test]
    fn test_string_and_stream_round_trip() {
        let mut manager = manager(SecurityOptions::default().with_key_cache(16));
        assert!(manager.authorize("user"));
        let obj = ObjectRef::new(7, 0);

        let encrypted = manager.encrypt_string(obj, b"(Title)").unwrap();
        assert_eq!(manager.decrypt_string(obj, &encrypted).unwrap(), b"(Title)".to_vec());

        let encrypted = manager.encrypt_stream(obj, None, b"BT /F1 12 Tf ET").unwrap();
        assert_eq!(manager.decrypt_stream(obj, None, &encrypted).unwrap(), b"BT /F1 12 Tf ET".to_vec());
        assert_eq!(manager.decrypt(obj, PayloadKind::Stream, &encrypted).unwrap(), b"BT /F1 12 Tf ET".to_vec());
    }

    #[test]
    fn test_decrypt_or_original() {
        let mut manager = manager(SecurityOptions::default());
        assert!(manager.authorize("user"));
        let obj = ObjectRef::new(3, 0);

        // Not a whole number of AES blocks
        let corrupt = vec![0x11u8; 21];
        let out = manager.decrypt_or_original(obj, PayloadKind::Stream, None, &corrupt).unwrap();
        assert_eq!(out, corrupt);

        let mut strict = self::manager(SecurityOptions::default().with_fallback_to_original(false));
        assert!(strict.authorize("user"));
        assert!(strict.decrypt_or_original(obj, PayloadKind::Stream, None, &corrupt).unwrap().is_empty());
    }

    #[test]
    fn test_decrypt_or_original_requires_authorization() {
        let manager = manager(SecurityOptions::default());
        let err = manager
            .decrypt_or_original(ObjectRef::new(1, 0), PayloadKind::String, None, b"data")
            .unwrap_err();
        assert!(matches!(err, PdfSecurityError::NotAuthenticated));
    }

    #[test]
    fn test_stream_fallback_rewinds() {
        let mut manager = manager(SecurityOptions::default());
        assert!(manager.authorize("user"));
        let obj = ObjectRef::new(4, 0);

        let corrupt = vec![0x22u8; 37];
        let mut out = Vec::new();
        let written = manager
            .decrypt_stream_to_or_original(obj, PayloadKind::Stream, None, &mut Cursor::new(&corrupt), &mut out)
            .unwrap();
        assert_eq!(written, corrupt.len() as u64);
        assert_eq!(out, corrupt);

        let encrypted = manager.encrypt_stream(obj, None, b"stream body").unwrap();
        let mut out = Vec::new();
        manager
            .decrypt_stream_to_or_original(obj, PayloadKind::Stream, None, &mut Cursor::new(&encrypted), &mut out)
            .unwrap();
        assert_eq!(out, b"stream body".to_vec());
    }

    #[test]
    fn test_rejects_unknown_handler() {
        let dict = Dictionary::new()
            .with("Filter", Value::name("Adobe.PubSec"))
            .with("V", Value::Integer(4))
            .with("R", Value::Integer(4))
            .with("O", Value::bytes(vec![0u8; 32]))
            .with("U", Value::bytes(vec![0u8; 32]))
            .with("P", Value::Integer(-4));
        let err = SecurityManager::from_dictionary(&dict, b"ID", SecurityOptions::default()).unwrap_err();
        assert!(err.is_fatal());
    }
}
