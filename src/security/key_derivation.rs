//! Password to key algorithms of the standard security handler

use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};
use md5::{Digest, Md5};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::descriptor::EncryptionDescriptor;
use super::{ct_eq, FileKey, Role, PASSWORD_PADDING};
use crate::crypto::{aes256_decrypt_no_padding, rc4_apply};
use crate::error::{PdfSecurityError, PdfSecurityResult};

/// Revision 5 passwords are capped at this many bytes
const R5_MAX_PASSWORD_LEN: usize = 127;
/// Extra RC4 passes of revision 3+ verifiers
const RC4_ROUNDS: u8 = 19;
/// Extra MD5 passes of revision 3+ key derivation
const MD5_ROUNDS: usize = 50;

/// Pad or truncate a password to exactly 32 bytes.
pub fn pad_password(password: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut padded = Zeroizing::new([0u8; 32]);
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// Algorithm 2: file encryption key for revisions 2 to 4.
pub fn compute_file_key(password: &[u8], descriptor: &EncryptionDescriptor) -> FileKey {
    let n = descriptor.key_length().min(16);
    let padded = pad_password(password);

    let mut p = [0u8; 4];
    LittleEndian::write_i32(&mut p, descriptor.p());

    let mut hasher = Md5::new();
    hasher.update(&padded[..]);
    hasher.update(descriptor.owner_verifier());
    hasher.update(p);
    hasher.update(descriptor.file_id());
    if descriptor.revision() >= 4 && !descriptor.encrypt_metadata() {
        hasher.update([0xFF; 4]);
    }

    let mut digest = Zeroizing::new(hasher.finalize().to_vec());
    if descriptor.revision() >= 3 {
        for _ in 0..MD5_ROUNDS {
            let next = Md5::digest(&digest[..n]);
            digest.copy_from_slice(&next);
        }
    }

    FileKey::new(digest[..n].to_vec())
}

/// Steps 1 to 4 of Algorithm 3: the RC4 key protecting /O.
///
/// `password` is the owner password, or the user password when no owner
/// password was set.
pub(crate) fn owner_rc4_key(password: &[u8], revision: u32, key_length: usize) -> Zeroizing<Vec<u8>> {
    let padded = pad_password(password);
    let mut digest = Zeroizing::new(Md5::digest(&padded[..]).to_vec());
    if revision >= 3 {
        for _ in 0..MD5_ROUNDS {
            let next = Md5::digest(&digest[..]);
            digest.copy_from_slice(&next);
        }
    }
    digest.truncate(key_length.min(16));
    digest
}

/// RC4 key with every byte XORed with `round`
pub(crate) fn xor_key(key: &[u8], round: u8) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(key.iter().map(|b| b ^ round).collect())
}

/// Algorithm 3: the /O value.
///
/// Only needed when writing a descriptor; opening a document never calls it.
pub fn compute_owner_verifier(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u32,
    length: u32,
) -> PdfSecurityResult<Vec<u8>> {
    let key_length = if revision == 2 { 5 } else { (length / 8) as usize };
    if !(5..=16).contains(&key_length) {
        return Err(PdfSecurityError::InvalidKeyLength(key_length));
    }

    let password = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = owner_rc4_key(password, revision, key_length);

    let mut value = rc4_apply(&key, &pad_password(user_password)[..])?;
    if revision >= 3 {
        for round in 1..=RC4_ROUNDS {
            value = rc4_apply(&xor_key(&key, round), &value)?;
        }
    }

    Ok(value)
}

/// Algorithms 4 and 5: the /U value for revisions 2 to 4.
///
/// For revision 3+ only the first 16 bytes are significant; the remainder is
/// filled from the padding string.
pub fn compute_user_verifier(
    user_password: &[u8],
    descriptor: &EncryptionDescriptor,
) -> PdfSecurityResult<Vec<u8>> {
    let key = compute_file_key(user_password, descriptor);

    match descriptor.revision() {
        2 => rc4_apply(key.as_bytes(), &PASSWORD_PADDING),
        3 | 4 => {
            let mut hasher = Md5::new();
            hasher.update(PASSWORD_PADDING);
            hasher.update(descriptor.file_id());
            let mut value = rc4_apply(key.as_bytes(), &hasher.finalize())?;
            for round in 1..=RC4_ROUNDS {
                value = rc4_apply(&xor_key(key.as_bytes(), round), &value)?;
            }
            value.extend_from_slice(&PASSWORD_PADDING[..16]);
            Ok(value)
        }
        r => Err(PdfSecurityError::unsupported(format!(
            "user verifier for R={}",
            r
        ))),
    }
}

/// Revision 5: recover the file key from either password.
///
/// The owner password is tried first. `Ok(None)` means neither matched or the
/// decrypted /Perms did not agree with /P.
pub fn compute_file_key_r5(
    password: &[u8],
    descriptor: &EncryptionDescriptor,
) -> PdfSecurityResult<Option<(FileKey, Role)>> {
    let candidate = match r5_owner_key(password, descriptor)? {
        Some(key) => Some((key, Role::Owner)),
        None => r5_user_key(password, descriptor)?.map(|key| (key, Role::User)),
    };

    let Some((key, role)) = candidate else {
        return Ok(None);
    };

    if !r5_perms_match(&key, descriptor)? {
        warn!("{:?} password matched but /Perms does not agree with /P", role);
        return Ok(None);
    }

    Ok(Some((key, role)))
}

/// Owner branch of revision 5: hash check against O[0..32], then unwrap /OE.
pub(crate) fn r5_owner_key(
    password: &[u8],
    descriptor: &EncryptionDescriptor,
) -> PdfSecurityResult<Option<FileKey>> {
    let password = &password[..password.len().min(R5_MAX_PASSWORD_LEN)];
    let o = leading("O", descriptor.owner_verifier(), 48)?;
    let u = leading("U", descriptor.user_verifier(), 48)?;

    let hash = sha256(&[password, &o[32..40], u]);
    if !ct_eq(&hash[..], &o[..32]) {
        return Ok(None);
    }

    trace!("Revision 5 owner hash matched");
    let intermediate = sha256(&[password, &o[40..48], u]);
    let oe = descriptor
        .owner_encrypted_key()
        .ok_or_else(|| PdfSecurityError::MissingDictionaryEntry("OE".to_string()))?;
    let key = aes256_decrypt_no_padding(&intermediate[..], leading("OE", oe, 32)?)?;
    Ok(Some(FileKey::new(key)))
}

/// User branch of revision 5: hash check against U[0..32], then unwrap /UE.
pub(crate) fn r5_user_key(
    password: &[u8],
    descriptor: &EncryptionDescriptor,
) -> PdfSecurityResult<Option<FileKey>> {
    let password = &password[..password.len().min(R5_MAX_PASSWORD_LEN)];
    let u = leading("U", descriptor.user_verifier(), 48)?;

    let hash = sha256(&[password, &u[32..40]]);
    if !ct_eq(&hash[..], &u[..32]) {
        return Ok(None);
    }

    trace!("Revision 5 user hash matched");
    let intermediate = sha256(&[password, &u[40..48]]);
    let ue = descriptor
        .user_encrypted_key()
        .ok_or_else(|| PdfSecurityError::MissingDictionaryEntry("UE".to_string()))?;
    let key = aes256_decrypt_no_padding(&intermediate[..], leading("UE", ue, 32)?)?;
    Ok(Some(FileKey::new(key)))
}

/// Decrypt /Perms with the file key and compare it with /P.
fn r5_perms_match(key: &FileKey, descriptor: &EncryptionDescriptor) -> PdfSecurityResult<bool> {
    let perms = descriptor
        .perms()
        .ok_or_else(|| PdfSecurityError::MissingDictionaryEntry("Perms".to_string()))?;
    let decrypted = Zeroizing::new(aes256_decrypt_no_padding(key.as_bytes(), leading("Perms", perms, 16)?)?);

    if &decrypted[9..12] != b"adb" {
        return Ok(false);
    }
    Ok(LittleEndian::read_i32(&decrypted[..4]) == descriptor.p())
}

/// First `len` bytes of a descriptor string, or `MalformedDescriptor` if it is shorter.
pub(crate) fn leading<'a>(key: &str, bytes: &'a [u8], len: usize) -> PdfSecurityResult<&'a [u8]> {
    bytes.get(..len).ok_or_else(|| {
        PdfSecurityError::malformed(format!("/{} is {} bytes, expected {}", key, bytes.len(), len))
    })
}

fn sha256(parts: &[&[u8]]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Zeroizing::new(hasher.finalize().into())
}


#[cfg(test)]
mod tests {
    use super::fixtures::{r5_descriptor, FILE_KEY};
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn rc4_descriptor(revision: u32, length: u32) -> EncryptionDescriptor {
        let version = if revision == 2 { 1 } else { 2 };
        EncryptionDescriptor::standard(version, revision, length, -44, b"ID1")
            .with_owner_verifier(vec![0xA5; 32])
    }

    #[test_log::test]
    fn test_pad_password() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PASSWORD_PADDING[..28]);

        let padded = pad_password(b"");
        assert_eq!(*padded, PASSWORD_PADDING);

        let long = [b'x'; 40];
        assert_eq!(&pad_password(&long)[..], &long[..32]);
    }

    #[rstest]
    #[case(2, 40, 5)]
    #[case(3, 40, 5)]
    #[case(3, 128, 16)]
    #[case(3, 96, 12)]
    fn test_file_key_length(#[case] revision: u32, #[case] length: u32, #[case] expected: usize) {
        let descriptor = rc4_descriptor(revision, length);
        assert_eq!(compute_file_key(b"user", &descriptor).len(), expected);
    }

    #[test_log::test]
    fn test_file_key_depends_on_inputs() {
        let descriptor = rc4_descriptor(3, 128);
        let key = compute_file_key(b"user", &descriptor);
        assert_eq!(key, compute_file_key(b"user", &descriptor));
        assert_ne!(key, compute_file_key(b"other", &descriptor));

        let other_id = EncryptionDescriptor::standard(2, 3, 128, -44, b"ID2").with_owner_verifier(vec![0xA5; 32]);
        assert_ne!(key, compute_file_key(b"user", &other_id));
    }

    #[test_log::test]
    fn test_revision2_file_key_is_single_md5() {
        let descriptor = rc4_descriptor(2, 40);
        let mut hasher = Md5::new();
        hasher.update(&pad_password(b"")[..]);
        hasher.update([0xA5; 32]);
        hasher.update((-44i32).to_le_bytes());
        hasher.update(b"ID1");
        let expected = hasher.finalize();
        assert_eq!(compute_file_key(b"", &descriptor).as_bytes(), &expected[..5]);
    }

    #[test_log::test]
    fn test_metadata_flag_changes_revision4_key() {
        let base = EncryptionDescriptor::standard(4, 4, 128, -4, b"ID").with_owner_verifier(vec![0x10; 32]);
        let clear_metadata = base.clone().with_encrypt_metadata(false);
        assert_ne!(
            compute_file_key(b"pw", &base),
            compute_file_key(b"pw", &clear_metadata)
        );

        // Revision 3 ignores the flag
        let r3 = rc4_descriptor(3, 128);
        assert_eq!(
            compute_file_key(b"pw", &r3),
            compute_file_key(b"pw", &r3.clone().with_encrypt_metadata(false))
        );
    }

    #[rstest]
    #[case(2, 40)]
    #[case(3, 128)]
    fn test_owner_verifier_shape(#[case] revision: u32, #[case] length: u32) {
        let o = compute_owner_verifier(b"owner", b"user", revision, length).unwrap();
        assert_eq!(o.len(), 32);
        assert_ne!(o, compute_owner_verifier(b"owner2", b"user", revision, length).unwrap());
    }

    #[test_log::test]
    fn test_owner_verifier_empty_owner_uses_user() {
        let a = compute_owner_verifier(b"", b"user", 3, 128).unwrap();
        let b = compute_owner_verifier(b"user", b"user", 3, 128).unwrap();
        assert_eq!(a, b);
    }

    #[test_log::test]
    fn test_owner_verifier_rejects_bad_length() {
        assert!(matches!(
            compute_owner_verifier(b"o", b"u", 3, 256),
            Err(PdfSecurityError::InvalidKeyLength(32))
        ));
    }

    #[test_log::test]
    fn test_user_verifier_revision2() {
        let descriptor = rc4_descriptor(2, 40);
        let u = compute_user_verifier(b"secret", &descriptor).unwrap();
        let key = compute_file_key(b"secret", &descriptor);
        assert_eq!(u, rc4_apply(key.as_bytes(), &PASSWORD_PADDING).unwrap());
    }

    #[test_log::test]
    fn test_user_verifier_revision3_padding_tail() {
        let descriptor = rc4_descriptor(3, 128);
        let u = compute_user_verifier(b"secret", &descriptor).unwrap();
        assert_eq!(u.len(), 32);
        assert_eq!(&u[16..], &PASSWORD_PADDING[..16]);
    }

    #[test_log::test]
    fn test_r5_user_and_owner() {
        let descriptor = r5_descriptor(b"user", b"owner", -3904, b"adb");
        descriptor.validate().unwrap();

        let (key, role) = compute_file_key_r5(b"user", &descriptor).unwrap().unwrap();
        assert_eq!(role, Role::User);
        assert_eq!(key.as_bytes(), &FILE_KEY[..]);

        let (key, role) = compute_file_key_r5(b"owner", &descriptor).unwrap().unwrap();
        assert_eq!(role, Role::Owner);
        assert_eq!(key.as_bytes(), &FILE_KEY[..]);

        assert!(compute_file_key_r5(b"wrong", &descriptor).unwrap().is_none());
    }

    #[test_log::test]
    fn test_r5_password_truncated_to_127_bytes() {
        let long = vec![b'p'; 200];
        let descriptor = r5_descriptor(&long[..127], b"owner", -4, b"adb");
        let (_, role) = compute_file_key_r5(&long, &descriptor).unwrap().unwrap();
        assert_eq!(role, Role::User);
    }

    #[test_log::test]
    fn test_r5_bad_perms_marker_rejects() {
        let descriptor = r5_descriptor(b"user", b"owner", -4, b"xyz");
        assert!(compute_file_key_r5(b"user", &descriptor).unwrap().is_none());
    }

    #[test_log::test]
    fn test_r5_perms_must_echo_p() {
        let descriptor = r5_descriptor(b"user", b"owner", -4, b"adb");
        // Same verifiers, different /P
        let tampered = EncryptionDescriptor::standard(5, 5, 256, -8, b"")
            .with_owner_verifier(descriptor.owner_verifier().to_vec())
            .with_user_verifier(descriptor.user_verifier().to_vec())
            .with_encrypted_keys(
                descriptor.owner_encrypted_key().unwrap().to_vec(),
                descriptor.user_encrypted_key().unwrap().to_vec(),
            )
            .with_perms(descriptor.perms().unwrap().to_vec());
        assert!(compute_file_key_r5(b"user", &tampered).unwrap().is_none());
    }

    #[test_log::test]
    fn test_r5_short_fields_are_malformed() {
        let empty = EncryptionDescriptor::standard(5, 5, 256, -4, b"");
        assert!(matches!(
            compute_file_key_r5(b"user", &empty),
            Err(PdfSecurityError::MalformedDescriptor(_))
        ));

        let short_perms = r5_descriptor(b"user", b"owner", -4, b"adb").with_perms(vec![0u8; 8]);
        assert!(matches!(
            compute_file_key_r5(b"user", &short_perms),
            Err(PdfSecurityError::MalformedDescriptor(_))
        ));

        let short_ue = r5_descriptor(b"user", b"owner", -4, b"adb")
            .with_encrypted_keys(vec![0u8; 32], vec![0u8; 16]);
        assert!(matches!(
            compute_file_key_r5(b"user", &short_ue),
            Err(PdfSecurityError::MalformedDescriptor(_))
        ));
    }
}
