//! Crypt filters (/CF, /StmF, /StrF, /EFF) for version 4 and 5 handlers

use std::collections::HashMap;
use std::fmt;

use log::{trace, warn};

use crate::error::{PdfSecurityError, PdfSecurityResult};
use crate::pdf::Dictionary;

/// Cipher named by a crypt filter's /CFM entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptFilterMethod {
    /// No encryption; the application decrypts itself
    None,
    /// RC4
    V2,
    /// AES-128-CBC
    AesV2,
    /// AES-256-CBC
    AesV3,
}

impl CryptFilterMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "None" => Some(Self::None),
            "V2" => Some(Self::V2),
            "AESV2" => Some(Self::AesV2),
            "AESV3" => Some(Self::AesV3),
            _ => None,
        }
    }

    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::V2 => "V2",
            Self::AesV2 => "AESV2",
            Self::AesV3 => "AESV3",
        }
    }
}

impl fmt::Display for CryptFilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pdf_name())
    }
}

/// When the filter's password has to be supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthEvent {
    /// On document open
    #[default]
    DocOpen,
    /// When an embedded file is accessed
    EFOpen,
}

impl AuthEvent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DocOpen" => Some(Self::DocOpen),
            "EFOpen" => Some(Self::EFOpen),
            _ => None,
        }
    }

    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::DocOpen => "DocOpen",
            Self::EFOpen => "EFOpen",
        }
    }
}

/// One resolved crypt filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptFilter {
    pub method: CryptFilterMethod,
    pub auth_event: AuthEvent,
    /// Key length in bytes
    pub key_length: usize,
}

impl CryptFilter {
    /// The pass-through filter
    pub fn identity() -> Self {
        Self {
            method: CryptFilterMethod::None,
            auth_event: AuthEvent::DocOpen,
            key_length: 0,
        }
    }

    /// Parse a /CF entry. `default_key_length` (bytes) applies to V2 filters
    /// without /Length.
    fn from_dictionary(dict: &Dictionary, default_key_length: usize) -> Result<Self, String> {
        let method = match dict.get_name("CFM") {
            Some(name) => CryptFilterMethod::from_name(name)
                .ok_or_else(|| format!("crypt filter method {}", name))?,
            None => CryptFilterMethod::None,
        };

        let auth_event = match dict.get_name("AuthEvent") {
            Some(name) => AuthEvent::from_name(name).ok_or_else(|| format!("auth event {}", name))?,
            None => AuthEvent::DocOpen,
        };

        let key_length = match method {
            CryptFilterMethod::None => 0,
            CryptFilterMethod::AesV2 => 16,
            CryptFilterMethod::AesV3 => 32,
            CryptFilterMethod::V2 => {
                let length = match dict.get_integer("Length") {
                    // Small values are byte counts, larger ones bits
                    Some(n) if (1..=32).contains(&n) => n as usize,
                    Some(n) if n > 32 && n % 8 == 0 => (n / 8) as usize,
                    Some(n) => return Err(format!("RC4 key length {}", n)),
                    None => default_key_length,
                };
                if !(5..=16).contains(&length) {
                    return Err(format!("RC4 key length of {} bytes", length));
                }
                length
            }
        };

        Ok(Self {
            method,
            auth_event,
            key_length,
        })
    }
}

/// Named crypt filters of a document
#[derive(Debug, Clone, Default)]
pub struct CryptFilterTable {
    filters: HashMap<String, CryptFilter>,
    /// Entries present in /CF that name something this crate cannot apply
    unsupported: HashMap<String, String>,
    default_key_length: usize,
}

impl CryptFilterTable {
    /// Reserved pass-through filter name
    pub const IDENTITY: &'static str = "Identity";
    /// Reserved name of the standard handler's filter
    pub const STD_CF: &'static str = "StdCF";

    /// Build the table from a /CF dictionary.
    ///
    /// Entries that cannot be parsed are remembered and reported when looked up.
    pub fn from_dictionary(cf: Option<&Dictionary>, default_key_length: usize) -> Self {
        let mut table = Self {
            default_key_length,
            ..Self::default()
        };

        let Some(cf) = cf else {
            return table;
        };

        for (name, value) in cf.iter() {
            let Some(entry) = value.as_dict() else {
                warn!("Crypt filter {} is a {}, not a dictionary", name, value.type_name());
                table
                    .unsupported
                    .insert(name.to_string(), format!("{} entry", value.type_name()));
                continue;
            };
            match CryptFilter::from_dictionary(entry, default_key_length) {
                Ok(filter) => {
                    trace!("Crypt filter {}: {:?}", name, filter);
                    table.filters.insert(name.to_string(), filter);
                }
                Err(reason) => {
                    warn!("Crypt filter {} is unusable: {}", name, reason);
                    table.unsupported.insert(name.to_string(), reason);
                }
            }
        }

        table
    }

    /// Filter by name, including the reserved names
    pub fn get(&self, name: &str) -> Option<CryptFilter> {
        if name == Self::IDENTITY {
            return Some(CryptFilter::identity());
        }
        if let Some(filter) = self.filters.get(name) {
            return Some(*filter);
        }
        if name == Self::STD_CF && !self.unsupported.contains_key(name) {
            return Some(CryptFilter {
                method: CryptFilterMethod::V2,
                auth_event: AuthEvent::DocOpen,
                key_length: self.default_key_length,
            });
        }
        None
    }

    /// Like [`get`](Self::get) but distinguishes unusable entries from absent ones.
    pub fn lookup(&self, name: &str) -> PdfSecurityResult<CryptFilter> {
        if let Some(filter) = self.get(name) {
            return Ok(filter);
        }
        match self.unsupported.get(name) {
            Some(reason) => Err(PdfSecurityError::unsupported(format!(
                "crypt filter {}: {}",
                name, reason
            ))),
            None => Err(PdfSecurityError::UnknownCryptFilter(name.to_string())),
        }
    }

    /// Names defined in /CF
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
