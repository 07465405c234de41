//! PDF cryptographic engine implementation

mod aes;
mod engine;
mod key_cache;
mod rc4;

pub use engine::{derive_object_key, CryptoEngine};
pub use key_cache::ObjectKeyCache;
pub(crate) use self::aes::{aes256_decrypt_no_padding, AES_BLOCK_SIZE};
pub(crate) use self::rc4::rc4_apply;
#[cfg(test)]
pub(crate) use self::aes::aes256_encrypt_no_padding;

use std::io::{Read, Write};

use rand::{thread_rng, RngCore};

use crate::error::PdfSecurityResult;

/// Direction of a cipher operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

/// Source of initialization vectors for AES encryption.
pub trait IvSource: Send + Sync {
    fn fill_iv(&self, iv: &mut [u8; AES_BLOCK_SIZE]);
}

/// Fresh random IVs from the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngIvSource;

impl IvSource for ThreadRngIvSource {
    fn fill_iv(&self, iv: &mut [u8; AES_BLOCK_SIZE]) {
        thread_rng().fill_bytes(iv);
    }
}

/// Always hands out the same IV. Only meant for reproducible output.
#[derive(Debug, Clone, Copy)]
pub struct FixedIvSource(pub [u8; AES_BLOCK_SIZE]);

impl IvSource for FixedIvSource {
    fn fill_iv(&self, iv: &mut [u8; AES_BLOCK_SIZE]) {
        iv.copy_from_slice(&self.0);
    }
}

/// Cipher applied to an object payload with an already diversified key
pub(crate) trait CryptoProvider: Send + Sync {
    fn process_data(
        &self,
        key: &[u8],
        data: &[u8],
        mode: CipherMode,
        iv_source: &dyn IvSource,
    ) -> PdfSecurityResult<Vec<u8>>;

    /// Same transformation as `process_data`, reading and writing incrementally.
    /// Returns the number of bytes written.
    fn process_stream(
        &self,
        key: &[u8],
        reader: &mut dyn Read,
        writer: &mut dyn Write,
        mode: CipherMode,
        iv_source: &dyn IvSource,
    ) -> PdfSecurityResult<u64>;
}
