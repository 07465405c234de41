//! Standard security handler building blocks
//!
//! Everything in here is pure: descriptor parsing, permission decoding and the
//! password algorithms of the PDF specification (Algorithms 2 to 7 and the
//! SHA-256 based revision 5 scheme). State lives in the handler.

mod authentication;
mod crypt_filter;
mod descriptor;
mod key_derivation;
mod permissions;

pub use authentication::{authenticate_owner, authenticate_user, recover_user_password};
pub(crate) use authentication::check_user_password;
pub use crypt_filter::{AuthEvent, CryptFilter, CryptFilterMethod, CryptFilterTable};
pub use descriptor::EncryptionDescriptor;
pub use key_derivation::{
    compute_file_key, compute_file_key_r5, compute_owner_verifier, compute_user_verifier,
    pad_password,
};
pub use permissions::{Capability, PermissionSet};

#[cfg(test)]
pub(crate) use key_derivation::fixtures;

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Padding string appended to passwords shorter than 32 bytes
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41,
    0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80,
    0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// The document's file encryption key. Wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct FileKey(Zeroizing<Vec<u8>>);

impl FileKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for FileKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileKey([REDACTED; {}])", self.0.len())
    }
}

/// Which password matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Owner,
}

/// Outcome of `authorize` on a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationState {
    #[default]
    Unauthenticated,
    UserAuthenticated,
    OwnerAuthenticated,
    Rejected,
}

impl AuthenticationState {
    /// Whether encrypt/decrypt may proceed
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::UserAuthenticated | Self::OwnerAuthenticated)
    }
}

impl From<Role> for AuthenticationState {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::UserAuthenticated,
            Role::Owner => Self::OwnerAuthenticated,
        }
    }
}

/// What kind of payload is being processed; selects the crypt filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// String object (StrF)
    String,
    /// Ordinary stream (StmF unless the stream names its own filter)
    Stream,
    /// Embedded file stream (EFF, falling back to StmF)
    EmbeddedFile,
    /// Document metadata stream; left in the clear when EncryptMetadata is false
    Metadata,
}

/// Constant-time byte slice equality for verifier comparisons.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}
