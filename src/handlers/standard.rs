//! Standard (password) security handler

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, OnceLock};

use log::{debug, info, trace, warn};
use zeroize::Zeroizing;

use crate::crypto::{CipherMode, CryptoEngine, ObjectKeyCache};
use crate::error::{PdfSecurityError, PdfSecurityResult};
use crate::pdf::ObjectRef;
use crate::security::{
    check_user_password, compute_file_key, compute_file_key_r5, recover_user_password,
    AuthenticationState, CryptFilterTable, EncryptionDescriptor, FileKey, PayloadKind,
    PermissionSet, Role,
};
use crate::Algorithm;

/// Password-based security handler for one document.
///
/// `authorize` is the only mutating call. Once it succeeds, the
/// encrypt/decrypt methods take `&self` and may run from several threads.
pub struct StandardSecurityHandler {
    descriptor: EncryptionDescriptor,
    engine: Arc<CryptoEngine>,
    permissions: PermissionSet,
    state: AuthenticationState,
    /// Password object keys derive from; the user password even after an
    /// owner login. Unused for revision 5.
    active_password: Option<Zeroizing<Vec<u8>>>,
    file_key: OnceLock<FileKey>,
    key_cache: Option<ObjectKeyCache>,
}

impl StandardSecurityHandler {
    pub const FILTER: &'static str = "Standard";

    /// Create a handler, rejecting descriptors this crate cannot open.
    pub fn new(descriptor: EncryptionDescriptor, engine: Arc<CryptoEngine>) -> PdfSecurityResult<Self> {
        if descriptor.filter() != Self::FILTER {
            return Err(PdfSecurityError::UnsupportedFilter(descriptor.filter().to_string()));
        }
        descriptor.validate()?;

        let algorithms = [
            resolve(&descriptor, PayloadKind::String, None)?,
            resolve(&descriptor, PayloadKind::Stream, None)?,
            resolve(&descriptor, PayloadKind::EmbeddedFile, None)?,
        ];
        if let Some(missing) = algorithms.iter().find(|a| !engine.supports(**a)) {
            return Err(PdfSecurityError::unsupported(format!("no cipher provider for {}", missing)));
        }

        debug!(
            "Standard security handler: V={} R={} key length {} bytes, strings {}, streams {}",
            descriptor.version(),
            descriptor.revision(),
            descriptor.key_length(),
            algorithms[0],
            algorithms[1]
        );

        Ok(Self {
            permissions: descriptor.permissions(),
            descriptor,
            engine,
            state: AuthenticationState::Unauthenticated,
            active_password: None,
            file_key: OnceLock::new(),
            key_cache: None,
        })
    }

    /// Keep derived object keys in a bounded cache
    pub fn with_key_cache(mut self, capacity: usize) -> Self {
        self.key_cache = Some(ObjectKeyCache::new(capacity));
        self
    }

    /// Try `password` as user password, then as owner password.
    ///
    /// A wrong password yields `Ok(false)` and the `Rejected` state. Calling
    /// again discards whatever key the previous call produced.
    pub fn authorize(&mut self, password: &[u8]) -> PdfSecurityResult<bool> {
        self.reset();
        debug!("Authorizing against R={} handler", self.descriptor.revision());

        let role = if self.descriptor.revision() >= 5 {
            match compute_file_key_r5(password, &self.descriptor)? {
                Some((key, role)) => {
                    self.file_key = OnceLock::from(key);
                    Some(role)
                }
                None => None,
            }
        } else if check_user_password(password, &self.descriptor)? {
            self.active_password = Some(Zeroizing::new(password.to_vec()));
            Some(Role::User)
        } else {
            let recovered = recover_user_password(password, &self.descriptor)?;
            if check_user_password(&recovered, &self.descriptor)? {
                self.active_password = Some(recovered);
                Some(Role::Owner)
            } else {
                None
            }
        };

        self.state = match role {
            Some(role) => {
                info!("Authorized as {:?}", role);
                role.into()
            }
            None => {
                warn!("Password rejected");
                AuthenticationState::Rejected
            }
        };

        Ok(self.state.is_authenticated())
    }

    pub fn state(&self) -> AuthenticationState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn descriptor(&self) -> &EncryptionDescriptor {
        &self.descriptor
    }

    /// Cipher for a payload. `crypt_filter` is the name a stream carries in
    /// its /DecodeParms; it is ignored for strings.
    pub fn resolve_algorithm(&self, kind: PayloadKind, crypt_filter: Option<&str>) -> PdfSecurityResult<Algorithm> {
        resolve(&self.descriptor, kind, crypt_filter)
    }

    /// The file encryption key, derived from the active password on first use.
    pub fn file_key(&self) -> PdfSecurityResult<&FileKey> {
        if !self.state.is_authenticated() {
            return Err(PdfSecurityError::NotAuthenticated);
        }
        if let Some(key) = self.file_key.get() {
            return Ok(key);
        }
        let password = self
            .active_password
            .as_ref()
            .ok_or(PdfSecurityError::NotAuthenticated)?;
        Ok(self.file_key.get_or_init(|| {
            debug!("Deriving file key");
            compute_file_key(password, &self.descriptor)
        }))
    }

    pub fn encrypt(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        data: &[u8],
    ) -> PdfSecurityResult<Vec<u8>> {
        self.process(obj, kind, crypt_filter, data, CipherMode::Encrypt)
    }

    pub fn decrypt(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        data: &[u8],
    ) -> PdfSecurityResult<Vec<u8>> {
        self.process(obj, kind, crypt_filter, data, CipherMode::Decrypt)
    }

    /// Streaming encrypt; returns the number of bytes written.
    pub fn encrypt_stream(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> PdfSecurityResult<u64> {
        self.process_stream(obj, kind, crypt_filter, reader, writer, CipherMode::Encrypt)
    }

    /// Streaming decrypt; returns the number of bytes written.
    pub fn decrypt_stream(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> PdfSecurityResult<u64> {
        self.process_stream(obj, kind, crypt_filter, reader, writer, CipherMode::Decrypt)
    }

    /// Forget the password and every key, back to `Unauthenticated`.
    pub fn dispose(&mut self) {
        self.reset();
        self.state = AuthenticationState::Unauthenticated;
    }

    fn reset(&mut self) {
        self.active_password = None;
        self.file_key.take();
        if let Some(cache) = &self.key_cache {
            cache.clear();
        }
    }

    fn object_key(&self, obj: ObjectRef, algorithm: Algorithm) -> PdfSecurityResult<Zeroizing<Vec<u8>>> {
        let file_key = self.file_key()?;
        Ok(match &self.key_cache {
            Some(cache) => cache.get_or_derive(obj, algorithm, || {
                self.engine.object_key(file_key.as_bytes(), obj, algorithm)
            }),
            None => self.engine.object_key(file_key.as_bytes(), obj, algorithm),
        })
    }

    fn process(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        data: &[u8],
        mode: CipherMode,
    ) -> PdfSecurityResult<Vec<u8>> {
        if !self.state.is_authenticated() {
            return Err(PdfSecurityError::NotAuthenticated);
        }
        let algorithm = self.resolve_algorithm(kind, crypt_filter)?;
        trace!("{:?} {} {:?} via {}", mode, obj, kind, algorithm);
        if algorithm == Algorithm::Identity {
            return Ok(data.to_vec());
        }
        let key = self.object_key(obj, algorithm)?;
        self.engine.apply_with_object_key(&key, algorithm, data, mode)
    }

    fn process_stream(
        &self,
        obj: ObjectRef,
        kind: PayloadKind,
        crypt_filter: Option<&str>,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
        mode: CipherMode,
    ) -> PdfSecurityResult<u64> {
        if !self.state.is_authenticated() {
            return Err(PdfSecurityError::NotAuthenticated);
        }
        let algorithm = self.resolve_algorithm(kind, crypt_filter)?;
        trace!("{:?} stream {} {:?} via {}", mode, obj, kind, algorithm);
        if algorithm == Algorithm::Identity {
            return Ok(std::io::copy(reader, writer)?);
        }
        let key = self.object_key(obj, algorithm)?;
        self.engine
            .apply_stream_with_object_key(&key, algorithm, reader, writer, mode)
    }
}

impl fmt::Debug for StandardSecurityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardSecurityHandler")
            .field("version", &self.descriptor.version())
            .field("revision", &self.descriptor.revision())
            .field("state", &self.state)
            .field("has_file_key", &self.file_key.get().is_some())
            .field("key_cache", &self.key_cache)
            .finish_non_exhaustive()
    }
}

fn resolve(
    descriptor: &EncryptionDescriptor,
    kind: PayloadKind,
    crypt_filter: Option<&str>,
) -> PdfSecurityResult<Algorithm> {
    if !descriptor.uses_crypt_filters() {
        return Ok(Algorithm::Rc4);
    }

    let name = match kind {
        PayloadKind::String => descriptor.string_filter(),
        PayloadKind::Stream => crypt_filter.unwrap_or(descriptor.stream_filter()),
        PayloadKind::EmbeddedFile => crypt_filter.unwrap_or(descriptor.embedded_file_filter()),
        PayloadKind::Metadata => {
            if !descriptor.encrypt_metadata() {
                return Ok(Algorithm::Identity);
            }
            crypt_filter.unwrap_or(descriptor.stream_filter())
        }
    };

    if name == CryptFilterTable::IDENTITY {
        return Ok(Algorithm::Identity);
    }
    let filter = descriptor.crypt_filters().lookup(name)?;
    Ok(filter.method.into())
}
