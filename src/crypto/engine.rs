//! Core cryptographic engine implementation

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use log::trace;
use md5::{Digest, Md5};
use zeroize::Zeroizing;

use super::aes::AesProvider;
use super::rc4::Rc4Provider;
use super::{CipherMode, CryptoProvider, IvSource, ThreadRngIvSource};
use crate::error::{PdfSecurityError, PdfSecurityResult};
use crate::pdf::ObjectRef;
use crate::Algorithm;

/// Longest per-object key Algorithm 1 produces
const MAX_OBJECT_KEY_LEN: usize = 16;

const AES_SALT: &[u8; 4] = b"sAlT";

/// Algorithm 1: diversify the file key for one indirect object.
///
/// MD5(file key || low 3 bytes of object number || low 2 bytes of generation
/// [|| "sAlT" for AES]) truncated to min(n + 5, 16) bytes.
pub fn derive_object_key(file_key: &[u8], obj: ObjectRef, use_aes: bool) -> Zeroizing<Vec<u8>> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(obj.number_bytes());
    hasher.update(obj.generation_bytes());
    if use_aes {
        hasher.update(AES_SALT);
    }

    let hash = hasher.finalize();
    let key_len = (file_key.len() + 5).min(MAX_OBJECT_KEY_LEN);
    Zeroizing::new(hash[..key_len].to_vec())
}

/// Cipher provider registry shared by every handler of a document.
///
/// The engine is the only place cipher implementations are looked up;
/// handlers receive it at construction.
pub struct CryptoEngine {
    providers: HashMap<Algorithm, Box<dyn CryptoProvider>>,
    iv_source: Arc<dyn IvSource>,
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut algorithms: Vec<_> = self.providers.keys().copied().collect();
        algorithms.sort_by_key(|a| a.to_string());
        f.debug_struct("CryptoEngine")
            .field("algorithms", &algorithms)
            .finish_non_exhaustive()
    }
}

impl CryptoEngine {
    /// Create new cryptographic engine with random IVs
    pub fn new() -> Self {
        Self::with_iv_source(Arc::new(ThreadRngIvSource))
    }

    /// Create an engine drawing AES IVs from `iv_source`
    pub fn with_iv_source(iv_source: Arc<dyn IvSource>) -> Self {
        let mut providers: HashMap<Algorithm, Box<dyn CryptoProvider>> = HashMap::new();

        providers.insert(Algorithm::Rc4, Box::new(Rc4Provider));
        providers.insert(Algorithm::Aes128, Box::new(AesProvider::new(16)));
        providers.insert(Algorithm::Aes256, Box::new(AesProvider::new(32)));

        Self {
            providers,
            iv_source,
        }
    }

    /// Whether a cipher implementation is registered for `algorithm`
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        algorithm == Algorithm::Identity || self.providers.contains_key(&algorithm)
    }

    /// Key actually fed to the cipher for `obj`.
    ///
    /// AES-256 (V5) uses the file key as is; the other algorithms diversify it.
    pub fn object_key(&self, file_key: &[u8], obj: ObjectRef, algorithm: Algorithm) -> Zeroizing<Vec<u8>> {
        match algorithm {
            Algorithm::Aes256 | Algorithm::Identity => Zeroizing::new(file_key.to_vec()),
            Algorithm::Rc4 => derive_object_key(file_key, obj, false),
            Algorithm::Aes128 => derive_object_key(file_key, obj, true),
        }
    }

    /// Encrypt or decrypt one string/stream payload belonging to `obj`.
    pub fn apply(
        &self,
        obj: ObjectRef,
        file_key: &[u8],
        algorithm: Algorithm,
        data: &[u8],
        mode: CipherMode,
    ) -> PdfSecurityResult<Vec<u8>> {
        if algorithm == Algorithm::Identity {
            return Ok(data.to_vec());
        }
        let key = self.object_key(file_key, obj, algorithm);
        self.apply_with_object_key(&key, algorithm, data, mode)
    }

    /// Like [`apply`](Self::apply) with a key already diversified for the object.
    pub fn apply_with_object_key(
        &self,
        object_key: &[u8],
        algorithm: Algorithm,
        data: &[u8],
        mode: CipherMode,
    ) -> PdfSecurityResult<Vec<u8>> {
        if algorithm == Algorithm::Identity {
            return Ok(data.to_vec());
        }
        trace!("{:?} {} bytes with {}", mode, data.len(), algorithm);
        let provider = self.get_provider(algorithm)?;
        provider.process_data(object_key, data, mode, self.iv_source.as_ref())
    }

    /// Streaming counterpart of [`apply`](Self::apply). Returns bytes written.
    pub fn apply_stream(
        &self,
        obj: ObjectRef,
        file_key: &[u8],
        algorithm: Algorithm,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
        mode: CipherMode,
    ) -> PdfSecurityResult<u64> {
        let key = self.object_key(file_key, obj, algorithm);
        self.apply_stream_with_object_key(&key, algorithm, reader, writer, mode)
    }

    /// Streaming counterpart of [`apply_with_object_key`](Self::apply_with_object_key).
    pub fn apply_stream_with_object_key(
        &self,
        object_key: &[u8],
        algorithm: Algorithm,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
        mode: CipherMode,
    ) -> PdfSecurityResult<u64> {
        if algorithm == Algorithm::Identity {
            return Ok(std::io::copy(reader, writer)?);
        }
        trace!("{:?} stream with {}", mode, algorithm);
        let provider = self.get_provider(algorithm)?;
        provider.process_stream(object_key, reader, writer, mode, self.iv_source.as_ref())
    }

    fn get_provider(&self, algorithm: Algorithm) -> PdfSecurityResult<&dyn CryptoProvider> {
        self.providers
            .get(&algorithm)
            .map(|p| p.as_ref())
            .ok_or_else(|| PdfSecurityError::unsupported(algorithm.to_string()))
    }
}
