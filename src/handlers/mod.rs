//! Security handlers for PDF encryption/decryption

mod standard;

pub use standard::StandardSecurityHandler;

use std::io::{Read, Write};
use std::sync::Arc;

use log::debug;

use crate::crypto::CryptoEngine;
use crate::error::{PdfSecurityError, PdfSecurityResult};
use crate::pdf::ObjectRef;
use crate::security::{AuthenticationState, EncryptionDescriptor, PayloadKind, PermissionSet};
use crate::Algorithm;

/// Security handlers this crate can open, selected by /Filter
#[derive(Debug)]
pub enum SecurityHandler {
    /// Standard password-based security handler
    Standard(StandardSecurityHandler),
}

impl SecurityHandler {
    /// /Filter names with a registered handler
    pub const FILTERS: &'static [&'static str] = &[StandardSecurityHandler::FILTER];

    /// Pick the handler named by the descriptor's /Filter.
    pub fn for_descriptor(descriptor: EncryptionDescriptor, engine: Arc<CryptoEngine>) -> PdfSecurityResult<Self> {
        debug!("Selecting security handler for /Filter {}", descriptor.filter());
        match descriptor.filter() {
            StandardSecurityHandler::FILTER => {
                Ok(SecurityHandler::Standard(StandardSecurityHandler::new(descriptor, engine)?))
            }
            other => Err(PdfSecurityError::UnsupportedFilter(other.to_string())),
        }
    }

    pub fn filter_name(&self) -> &'static str {
        match self {
            SecurityHandler::Standard(_) => StandardSecurityHandler::FILTER,
        }
    }

    pub fn with_key_cache(self, capacity: usize) -> Self {
        match self {
            SecurityHandler::Standard(handler) => SecurityHandler::Standard(handler.with_key_cache(capacity)),
        }
    }

    /// Authenticate with password
    pub fn authorize(&mut self, password: &[u8]) -> PdfSecurityResult<bool> {
        match self {
            SecurityHandler::Standard(handler) => handler.authorize(password),
        }
    }

    pub fn state(&self) -> AuthenticationState {
        match self {
            SecurityHandler::Standard(handler) => handler.state(),
        }
    }

    pub fn permissions(&self) -> &PermissionSet {
        match self {
            SecurityHandler::Standard(handler) => handler.permissions(),
        }
    }

    pub fn descriptor(&self) -> &EncryptionDescriptor {
        match self {
            SecurityHandler::Standard(handler) => handler.descriptor(),
        }
    }

    pub fn resolve_algorithm(&self, kind: PayloadKind, crypt_filter: Option<&str>) -> PdfSecurityResult<Algorithm> {
        match self {
            SecurityHandler::Standard(handler) => handler.resolve_algorithm(kind, crypt_filter),
        }
    }

    pub fn encrypt(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        data: &[u8],
    ) -> PdfSecurityResult<Vec<u8>> {
        match self {
            SecurityHandler::Standard(handler) => handler.encrypt(obj, kind, crypt_filter, data),
        }
    }

    pub fn decrypt(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        data: &[u8],
    ) -> PdfSecurityResult<Vec<u8>> {
        match self {
            SecurityHandler::Standard(handler) => handler.decrypt(obj, kind, crypt_filter, data),
        }
    }

    pub fn encrypt_stream(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> PdfSecurityResult<u64> {
        match self {
            SecurityHandler::Standard(handler) => handler.encrypt_stream(obj, kind, crypt_filter, reader, writer),
        }
    }

    pub fn decrypt_stream(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> PdfSecurityResult<u64> {
        match self {
            SecurityHandler::Standard(handler) => handler.decrypt_stream(obj, kind, crypt_filter, reader, writer),
        }
    }

    pub fn dispose(&mut self) {
        match self {
            SecurityHandler::Standard(handler) => handler.dispose(),
        }
    }
}
