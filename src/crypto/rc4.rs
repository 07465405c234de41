//! RC4 encryption provider implementation

use std::io::{Read, Write};

use rc4::consts::{U10, U11, U12, U13, U14, U15, U16, U5, U6, U7, U8, U9};
use rc4::{KeyInit, Rc4, StreamCipher};

use super::{CipherMode, CryptoProvider, IvSource};
use crate::error::{PdfSecurityError, PdfSecurityResult};

const STREAM_CHUNK: usize = 8192;

macro_rules! keyed_rc4 {
    ($($variant:ident => $size:ty, $len:literal;)+) => {
        /// RC4 state for any key length PDF allows (40 to 128 bits)
        pub(crate) enum Rc4State {
            $($variant(Rc4<$size>),)+
        }

        impl Rc4State {
            pub(crate) fn new(key: &[u8]) -> PdfSecurityResult<Self> {
                match key.len() {
                    $($len => Ok(Self::$variant(
                        Rc4::<$size>::new_from_slice(key)
                            .map_err(|_| PdfSecurityError::InvalidKeyLength(key.len()))?,
                    )),)+
                    n => Err(PdfSecurityError::InvalidKeyLength(n)),
                }
            }

            pub(crate) fn apply_keystream(&mut self, data: &mut [u8]) {
                match self {
                    $(Self::$variant(cipher) => cipher.apply_keystream(data),)+
                }
            }
        }
    };
}

keyed_rc4! {
    K5 => U5, 5;
    K6 => U6, 6;
    K7 => U7, 7;
    K8 => U8, 8;
    K9 => U9, 9;
    K10 => U10, 10;
    K11 => U11, 11;
    K12 => U12, 12;
    K13 => U13, 13;
    K14 => U14, 14;
    K15 => U15, 15;
    K16 => U16, 16;
}

/// One-shot RC4 over a buffer. Encryption and decryption are the same operation.
pub(crate) fn rc4_apply(key: &[u8], data: &[u8]) -> PdfSecurityResult<Vec<u8>> {
    let mut cipher = Rc4State::new(key)?;
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    Ok(out)
}

/// RC4 encryption provider
#[derive(Debug, Default)]
pub(crate) struct Rc4Provider;

impl CryptoProvider for Rc4Provider {
    fn process_data(
        &self,
        key: &[u8],
        data: &[u8],
        _mode: CipherMode,
        _iv_source: &dyn IvSource,
    ) -> PdfSecurityResult<Vec<u8>> {
        rc4_apply(key, data)
    }

    fn process_stream(
        &self,
        key: &[u8],
        reader: &mut dyn Read,
        writer: &mut dyn Write,
        _mode: CipherMode,
        _iv_source: &dyn IvSource,
    ) -> PdfSecurityResult<u64> {
        let mut cipher = Rc4State::new(key)?;
        let mut buf = vec![0u8; STREAM_CHUNK];
        let mut written = 0u64;

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            cipher.apply_keystream(&mut buf[..n]);
            writer.write_all(&buf[..n])?;
            written += n as u64;
        }

        Ok(written)
    }
}
