//! Password authentication (Algorithms 6 and 7)

use log::{debug, warn};
use zeroize::Zeroizing;

use super::descriptor::EncryptionDescriptor;
use super::key_derivation::{
    compute_user_verifier, leading, owner_rc4_key, r5_owner_key, r5_user_key, xor_key,
};
use super::ct_eq;
use crate::crypto::rc4_apply;
use crate::error::{PdfSecurityError, PdfSecurityResult};

/// Algorithm 6: is `password` the user password?
pub fn authenticate_user(password: &[u8], descriptor: &EncryptionDescriptor) -> bool {
    check_user_password(password, descriptor).unwrap_or_else(|err| {
        warn!("User password check failed: {}", err);
        false
    })
}

/// Algorithm 7: is `password` the owner password?
pub fn authenticate_owner(password: &[u8], descriptor: &EncryptionDescriptor) -> bool {
    check_owner_password(password, descriptor).unwrap_or_else(|err| {
        warn!("Owner password check failed: {}", err);
        false
    })
}

/// Decrypt /O with the key derived from a candidate owner password.
///
/// The result is the padded user password if the candidate is right, and
/// garbage otherwise. Revisions 2 to 4 only.
pub fn recover_user_password(
    owner_password: &[u8],
    descriptor: &EncryptionDescriptor,
) -> PdfSecurityResult<Zeroizing<Vec<u8>>> {
    let revision = descriptor.revision();
    if revision >= 5 {
        return Err(PdfSecurityError::unsupported(format!(
            "no recoverable user password for R={}",
            revision
        )));
    }
    let o = leading("O", descriptor.owner_verifier(), 32)?;
    let key = owner_rc4_key(owner_password, revision, descriptor.key_length());

    let recovered = if revision == 2 {
        rc4_apply(&key, o)?
    } else {
        let mut value = o.to_vec();
        for round in (0..=19u8).rev() {
            value = rc4_apply(&xor_key(&key, round), &value)?;
        }
        value
    };

    Ok(Zeroizing::new(recovered))
}

pub(crate) fn check_user_password(
    password: &[u8],
    descriptor: &EncryptionDescriptor,
) -> PdfSecurityResult<bool> {
    if descriptor.revision() >= 5 {
        return Ok(r5_user_key(password, descriptor)?.is_some());
    }

    let significant = if descriptor.revision() == 2 { 32 } else { 16 };
    let stored = leading("U", descriptor.user_verifier(), significant)?;
    let computed = Zeroizing::new(compute_user_verifier(password, descriptor)?);
    let matched = ct_eq(&computed[..significant], stored);
    debug!("User password check (R={}): {}", descriptor.revision(), matched);
    Ok(matched)
}

pub(crate) fn check_owner_password(
    password: &[u8],
    descriptor: &EncryptionDescriptor,
) -> PdfSecurityResult<bool> {
    if descriptor.revision() >= 5 {
        return Ok(r5_owner_key(password, descriptor)?.is_some());
    }

    let recovered = recover_user_password(password, descriptor)?;
    check_user_password(&recovered, descriptor)
}
