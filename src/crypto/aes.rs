//! AES-CBC encryption provider implementation
//!
//! PDF AES payloads carry their 16-byte IV in front of the ciphertext and use
//! PKCS#5 padding. The same provider serves AESV2 (128-bit, per-object keys)
//! and AESV3 (256-bit, file key used directly); the key length selects the
//! block cipher.

use std::io::{Read, Write};

use aes::{Aes128, Aes256, Block};
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::{CipherMode, CryptoProvider, IvSource};
use crate::error::{PdfSecurityError, PdfSecurityResult};

pub(crate) const AES_BLOCK_SIZE: usize = 16;

const STREAM_CHUNK: usize = 8192;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// CBC encryptor for either key size
enum CbcEncryptor {
    Aes128(Aes128CbcEnc),
    Aes256(Aes256CbcEnc),
}

impl CbcEncryptor {
    fn new(key: &[u8], iv: &[u8]) -> PdfSecurityResult<Self> {
        match key.len() {
            16 => Ok(Self::Aes128(Aes128CbcEnc::new_from_slices(key, iv)?)),
            32 => Ok(Self::Aes256(Aes256CbcEnc::new_from_slices(key, iv)?)),
            n => Err(PdfSecurityError::InvalidKeyLength(n)),
        }
    }

    fn encrypt_block(&mut self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.encrypt_block_mut(block),
            Self::Aes256(c) => c.encrypt_block_mut(block),
        }
    }
}

/// CBC decryptor for either key size
enum CbcDecryptor {
    Aes128(Aes128CbcDec),
    Aes256(Aes256CbcDec),
}

impl CbcDecryptor {
    fn new(key: &[u8], iv: &[u8]) -> PdfSecurityResult<Self> {
        match key.len() {
            16 => Ok(Self::Aes128(Aes128CbcDec::new_from_slices(key, iv)?)),
            32 => Ok(Self::Aes256(Aes256CbcDec::new_from_slices(key, iv)?)),
            n => Err(PdfSecurityError::InvalidKeyLength(n)),
        }
    }

    fn decrypt_block(&mut self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.decrypt_block_mut(block),
            Self::Aes256(c) => c.decrypt_block_mut(block),
        }
    }
}

/// Encrypt `data` with PKCS#5 padding; returns IV || ciphertext.
fn encrypt_with_iv(key: &[u8], iv: &[u8; AES_BLOCK_SIZE], data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
        32 => Aes256CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<Pkcs7>(data),
        n => return Err(PdfSecurityError::InvalidKeyLength(n)),
    };

    let mut out = Vec::with_capacity(AES_BLOCK_SIZE + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt IV || ciphertext and strip PKCS#5 padding.
fn decrypt_with_iv(key: &[u8], data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
    if data.len() < AES_BLOCK_SIZE {
        return Err(PdfSecurityError::invalid_length("AES decryption (missing IV)"));
    }

    let (iv, ciphertext) = data.split_at(AES_BLOCK_SIZE);
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    if ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(PdfSecurityError::cipher(format!(
            "AES ciphertext length {} is not a multiple of the block size",
            ciphertext.len()
        )));
    }

    let plaintext = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        32 => Aes256CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        n => return Err(PdfSecurityError::InvalidKeyLength(n)),
    }?;

    Ok(plaintext)
}

/// AES-256-CBC with a zero IV and no padding, as used for /OE, /UE and /Perms.
pub(crate) fn aes256_decrypt_no_padding(key: &[u8], data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        return Err(PdfSecurityError::invalid_length("AES-256 key unwrapping"));
    }
    let iv = [0u8; AES_BLOCK_SIZE];
    let plaintext = Aes256CbcDec::new_from_slices(key, &iv)?.decrypt_padded_vec_mut::<NoPadding>(data)?;
    Ok(plaintext)
}

/// Inverse of [`aes256_decrypt_no_padding`]; used to build revision 5 fixtures.
#[cfg(test)]
pub(crate) fn aes256_encrypt_no_padding(key: &[u8], data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        return Err(PdfSecurityError::invalid_length("AES-256 key wrapping"));
    }
    let iv = [0u8; AES_BLOCK_SIZE];
    Ok(Aes256CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<NoPadding>(data))
}

/// AES encryption provider
pub(crate) struct AesProvider {
    key_length: usize,
}

impl AesProvider {
    pub fn new(key_length: usize) -> Self {
        Self { key_length }
    }

    fn check_key(&self, key: &[u8]) -> PdfSecurityResult<()> {
        if key.len() != self.key_length {
            return Err(PdfSecurityError::InvalidKeyLength(key.len()));
        }
        Ok(())
    }

    fn encrypt_stream(
        &self,
        key: &[u8],
        reader: &mut dyn Read,
        writer: &mut dyn Write,
        iv_source: &dyn IvSource,
    ) -> PdfSecurityResult<u64> {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        iv_source.fill_iv(&mut iv);
        let mut cipher = CbcEncryptor::new(key, &iv)?;
        writer.write_all(&iv)?;
        let mut written = AES_BLOCK_SIZE as u64;

        let mut pending: Vec<u8> = Vec::with_capacity(STREAM_CHUNK + AES_BLOCK_SIZE);
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&buf[..n]);

            let whole = pending.len() - pending.len() % AES_BLOCK_SIZE;
            for chunk in pending[..whole].chunks_exact_mut(AES_BLOCK_SIZE) {
                cipher.encrypt_block(Block::from_mut_slice(chunk));
            }
            writer.write_all(&pending[..whole])?;
            written += whole as u64;
            pending.drain(..whole);
        }

        // PKCS#5: always emit a padding block, full when input is block aligned
        let pad = AES_BLOCK_SIZE - pending.len();
        pending.resize(AES_BLOCK_SIZE, pad as u8);
        cipher.encrypt_block(Block::from_mut_slice(&mut pending));
        writer.write_all(&pending)?;
        written += AES_BLOCK_SIZE as u64;

        Ok(written)
    }

    fn decrypt_stream(
        &self,
        key: &[u8],
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> PdfSecurityResult<u64> {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        read_iv(reader, &mut iv)?;
        let mut cipher = CbcDecryptor::new(key, &iv)?;

        let mut pending: Vec<u8> = Vec::with_capacity(STREAM_CHUNK + AES_BLOCK_SIZE);
        // The newest plaintext block is held back until we know whether it is the last one.
        let mut held: Option<Block> = None;
        let mut written = 0u64;
        let mut buf = vec![0u8; STREAM_CHUNK];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&buf[..n]);

            let whole = pending.len() - pending.len() % AES_BLOCK_SIZE;
            for chunk in pending[..whole].chunks_exact(AES_BLOCK_SIZE) {
                let mut block = Block::clone_from_slice(chunk);
                cipher.decrypt_block(&mut block);
                if let Some(previous) = held.replace(block) {
                    writer.write_all(&previous)?;
                    written += AES_BLOCK_SIZE as u64;
                }
            }
            pending.drain(..whole);
        }

        if !pending.is_empty() {
            return Err(PdfSecurityError::cipher(
                "AES stream length is not a multiple of the block size",
            ));
        }

        if let Some(last) = held {
            let plain = strip_pkcs5(&last)?;
            writer.write_all(plain)?;
            written += plain.len() as u64;
        }

        Ok(written)
    }
}

fn read_iv(reader: &mut dyn Read, iv: &mut [u8; AES_BLOCK_SIZE]) -> PdfSecurityResult<()> {
    let mut filled = 0;
    while filled < AES_BLOCK_SIZE {
        let n = reader.read(&mut iv[filled..])?;
        if n == 0 {
            return Err(PdfSecurityError::invalid_length("AES decryption (missing IV)"));
        }
        filled += n;
    }
    Ok(())
}

fn strip_pkcs5(block: &[u8]) -> PdfSecurityResult<&[u8]> {
    let pad = block[block.len() - 1] as usize;
    if pad == 0 || pad > AES_BLOCK_SIZE || block[block.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(PdfSecurityError::cipher("invalid PKCS#5 padding"));
    }
    Ok(&block[..block.len() - pad])
}

impl CryptoProvider for AesProvider {
    fn process_data(
        &self,
        key: &[u8],
        data: &[u8],
        mode: CipherMode,
        iv_source: &dyn IvSource,
    ) -> PdfSecurityResult<Vec<u8>> {
        self.check_key(key)?;
        match mode {
            CipherMode::Encrypt => {
                let mut iv = [0u8; AES_BLOCK_SIZE];
                iv_source.fill_iv(&mut iv);
                encrypt_with_iv(key, &iv, data)
            }
            CipherMode::Decrypt => decrypt_with_iv(key, data),
        }
    }

    fn process_stream(
        &self,
        key: &[u8],
        reader: &mut dyn Read,
        writer: &mut dyn Write,
        mode: CipherMode,
        iv_source: &dyn IvSource,
    ) -> PdfSecurityResult<u64> {
        self.check_key(key)?;
        match mode {
            CipherMode::Encrypt => self.encrypt_stream(key, reader, writer, iv_source),
            CipherMode::Decrypt => self.decrypt_stream(key, reader, writer),
        }
    }
}
