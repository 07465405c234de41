use std::io::Cursor;
use std::thread;

use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use pdf_security::security::{compute_owner_verifier, compute_user_verifier};
use pdf_security::{
    AuthenticationState, Capability, Dictionary, EncryptionDescriptor, ObjectRef, PayloadKind,
    PdfSecurityError, SecurityManager, SecurityOptions, Value,
};
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};
use test_log::test;

/// Trailer /Encrypt dictionary for V2/R3 whose /O and /U match the passwords
fn rc4_dictionary(user: &[u8], owner: &[u8], file_id: &[u8]) -> Dictionary {
    let o = compute_owner_verifier(owner, user, 3, 128).unwrap();
    let probe = EncryptionDescriptor::standard(2, 3, 128, -44, file_id).with_owner_verifier(o.clone());
    let u = compute_user_verifier(user, &probe).unwrap();

    Dictionary::new()
        .with("Filter", Value::name("Standard"))
        .with("V", Value::Integer(2))
        .with("R", Value::Integer(3))
        .with("Length", Value::Integer(128))
        .with("O", Value::bytes(o))
        .with("U", Value::bytes(u))
        .with("P", Value::Integer(-44))
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn wrap(key: &[u8], data: &[u8]) -> Vec<u8> {
    cbc::Encryptor::<aes::Aes256>::new_from_slices(key, &[0u8; 16])
        .unwrap()
        .encrypt_padded_vec_mut::<NoPadding>(data)
}

/// V5/R5 dictionary with AESV3 crypt filters
fn aes256_dictionary(user: &[u8], owner: &[u8], p: i32) -> Dictionary {
    let file_key = [0x3Au8; 32];
    let (user_salt, user_key_salt) = ([0x11u8; 8], [0x22u8; 8]);
    let (owner_salt, owner_key_salt) = ([0x33u8; 8], [0x44u8; 8]);

    let mut u = sha256(&[user, &user_salt[..]]).to_vec();
    u.extend_from_slice(&user_salt);
    u.extend_from_slice(&user_key_salt);
    let ue = wrap(&sha256(&[user, &user_key_salt[..]]), &file_key);

    let mut o = sha256(&[owner, &owner_salt[..], &u[..]]).to_vec();
    o.extend_from_slice(&owner_salt);
    o.extend_from_slice(&owner_key_salt);
    let oe = wrap(&sha256(&[owner, &owner_key_salt[..], &u[..]]), &file_key);

    let mut perms = [0u8; 16];
    perms[..4].copy_from_slice(&p.to_le_bytes());
    perms[4..8].copy_from_slice(&[0xFF; 4]);
    perms[8] = b'T';
    perms[9..12].copy_from_slice(b"adb");
    let perms = wrap(&file_key, &perms);

    let std_cf = Dictionary::new()
        .with("CFM", Value::name("AESV3"))
        .with("AuthEvent", Value::name("DocOpen"))
        .with("Length", Value::Integer(32));

    Dictionary::new()
        .with("Filter", Value::name("Standard"))
        .with("V", Value::Integer(5))
        .with("R", Value::Integer(5))
        .with("Length", Value::Integer(256))
        .with("O", Value::bytes(o))
        .with("U", Value::bytes(u))
        .with("OE", Value::bytes(oe))
        .with("UE", Value::bytes(ue))
        .with("Perms", Value::bytes(perms))
        .with("P", Value::Integer(p as i64))
        .with("CF", Dictionary::new().with("StdCF", std_cf))
        .with("StmF", Value::name("StdCF"))
        .with("StrF", Value::name("StdCF"))
}

#[test]
fn test_empty_user_password_round_trip() {
    let dict = rc4_dictionary(b"", b"owner", b"ID1");
    let mut manager = SecurityManager::from_dictionary(&dict, b"ID1", SecurityOptions::default()).unwrap();

    assert!(manager.authorize(""));
    assert_eq!(manager.auth_state(), AuthenticationState::UserAuthenticated);

    let obj = ObjectRef::new(5, 0);
    let plaintext = b"BT /F1 24 Tf 100 700 Td (Hello) Tj ET".to_vec();
    let ciphertext = manager.encrypt(obj, PayloadKind::Stream, &plaintext).unwrap();
    assert_ne!(ciphertext, plaintext);
    assert_eq!(manager.decrypt(obj, PayloadKind::Stream, &ciphertext).unwrap(), plaintext);
}

#[test]
fn test_owner_and_user_decrypt_alike() {
    let dict = rc4_dictionary(b"user", b"owner", b"ID1");
    let mut as_owner = SecurityManager::from_dictionary(&dict, b"ID1", SecurityOptions::default()).unwrap();
    let mut as_user = SecurityManager::from_dictionary(&dict, b"ID1", SecurityOptions::default()).unwrap();

    assert!(as_owner.authorize("owner"));
    assert_eq!(as_owner.auth_state(), AuthenticationState::OwnerAuthenticated);
    assert!(as_user.authorize("user"));

    let obj = ObjectRef::new(12, 2);
    let encrypted = as_owner.encrypt_string(obj, b"(Annual report)").unwrap();
    assert_eq!(as_user.decrypt_string(obj, &encrypted).unwrap(), b"(Annual report)".to_vec());
}

#[test]
fn test_wrong_file_id_rejects_password() {
    let dict = rc4_dictionary(b"user", b"owner", b"ID1");
    let mut manager = SecurityManager::from_dictionary(&dict, b"ID2", SecurityOptions::default()).unwrap();
    assert!(!manager.authorize("user"));
    assert_eq!(manager.auth_state(), AuthenticationState::Rejected);

    let err = manager.decrypt_string(ObjectRef::new(1, 0), b"x").unwrap_err();
    assert!(matches!(err, PdfSecurityError::NotAuthenticated));
}

#[test]
fn test_permissions_from_trailer() {
    let dict = rc4_dictionary(b"", b"owner", b"ID1");
    let manager = SecurityManager::from_dictionary(&dict, b"ID1", SecurityOptions::default()).unwrap();

    // -44 has every reserved bit set, bits 3 and 5 set, bits 4 and 6 clear
    let permissions = manager.permissions();
    assert!(permissions.has(Capability::Print));
    assert!(permissions.has(Capability::ExtractContent));
    assert!(!permissions.has(Capability::Modify));
    assert!(!permissions.has(Capability::AnnotateAndFillForms));
}

#[test]
fn test_aes256_document() {
    let dict = aes256_dictionary(b"reader", b"editor", -3904);
    let mut manager = SecurityManager::from_dictionary(&dict, b"", SecurityOptions::default()).unwrap();

    assert!(!manager.authorize("guess"));
    assert!(manager.authorize("editor"));
    assert_eq!(manager.auth_state(), AuthenticationState::OwnerAuthenticated);

    let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
    let encrypted = manager.encrypt_stream(ObjectRef::new(20, 0), None, &payload).unwrap();

    assert!(manager.authorize("reader"));
    assert_eq!(manager.auth_state(), AuthenticationState::UserAuthenticated);
    // AES-256 uses the file key directly, so the object number does not matter
    assert_eq!(manager.decrypt_stream(ObjectRef::new(99, 0), None, &encrypted).unwrap(), payload);
}

#[test]
fn test_aes256_tampered_perms() {
    let mut dict = aes256_dictionary(b"reader", b"editor", -3904);
    // Declared P no longer matches the encrypted copy
    dict.set("P", Value::Integer(-4));
    let mut manager = SecurityManager::from_dictionary(&dict, b"", SecurityOptions::default()).unwrap();
    assert!(!manager.authorize("reader"));
    assert!(!manager.authorize("editor"));
}

#[test]
fn test_revision6_is_refused() {
    let mut dict = aes256_dictionary(b"reader", b"editor", -4);
    dict.set("R", Value::Integer(6));
    let err = SecurityManager::from_dictionary(&dict, b"", SecurityOptions::default()).unwrap_err();
    assert!(matches!(err, PdfSecurityError::UnsupportedAlgorithm(_)));
}

#[test]
fn test_identity_stream_override() {
    let dict = aes256_dictionary(b"reader", b"editor", -4);
    let mut manager = SecurityManager::from_dictionary(&dict, b"", SecurityOptions::default()).unwrap();
    assert!(manager.authorize("reader"));

    let raw = b"<x:xmpmeta/>".to_vec();
    assert_eq!(manager.decrypt_stream(ObjectRef::new(2, 0), Some("Identity"), &raw).unwrap(), raw);
}

#[test]
fn test_unencrypted_metadata() {
    let dict = aes256_dictionary(b"reader", b"editor", -4).with("EncryptMetadata", Value::Boolean(false));
    let mut manager = SecurityManager::from_dictionary(&dict, b"", SecurityOptions::default()).unwrap();
    assert!(manager.authorize("reader"));

    let xmp = b"<?xpacket begin?>".to_vec();
    assert_eq!(manager.decrypt(ObjectRef::new(3, 0), PayloadKind::Metadata, &xmp).unwrap(), xmp);
    assert!(manager.decrypt(ObjectRef::new(3, 0), PayloadKind::Stream, &xmp).is_err());
}

#[test]
fn test_concurrent_decrypt() {
    let dict = rc4_dictionary(b"user", b"owner", b"ID1");
    let options = SecurityOptions::default().with_key_cache(4);
    let mut manager = SecurityManager::from_dictionary(&dict, b"ID1", options).unwrap();
    assert!(manager.authorize("user"));

    let objects: Vec<(ObjectRef, Vec<u8>, Vec<u8>)> = (1..=32u32)
        .map(|n| {
            let obj = ObjectRef::new(n, (n % 3) as u16);
            let plain = format!("stream body of object {}", n).into_bytes();
            let encrypted = manager.encrypt_stream(obj, None, &plain).unwrap();
            (obj, plain, encrypted)
        })
        .collect();

    let manager = &manager;
    thread::scope(|scope| {
        for worker in 0..4 {
            let objects = &objects;
            scope.spawn(move || {
                for (obj, plain, encrypted) in objects.iter().skip(worker).step_by(2) {
                    assert_eq!(&manager.decrypt_stream(*obj, None, encrypted).unwrap(), plain);
                }
            });
        }
    });
}

#[test]
fn test_streaming_matches_buffered() {
    let dict = aes256_dictionary(b"reader", b"editor", -4);
    let mut manager = SecurityManager::from_dictionary(&dict, b"", SecurityOptions::default()).unwrap();
    assert!(manager.authorize("reader"));

    let obj = ObjectRef::new(8, 0);
    let body = vec![0x5Au8; 20_000];
    let mut encrypted = Vec::new();
    manager
        .encrypt_stream_to(obj, PayloadKind::Stream, None, &mut Cursor::new(&body), &mut encrypted)
        .unwrap();
    assert_eq!(manager.decrypt_stream(obj, None, &encrypted).unwrap(), body);

    let mut plain = Vec::new();
    let written = manager
        .decrypt_stream_to(obj, PayloadKind::Stream, None, &mut Cursor::new(&encrypted), &mut plain)
        .unwrap();
    assert_eq!(written, body.len() as u64);
    assert_eq!(plain, body);
}

#[test]
fn test_broken_stream_does_not_abort_document() {
    let dict = aes256_dictionary(b"reader", b"editor", -4);
    let mut manager = SecurityManager::from_dictionary(&dict, b"", SecurityOptions::default()).unwrap();
    assert!(manager.authorize("reader"));

    let truncated = vec![0x01u8; 40];
    let out = manager
        .decrypt_or_original(ObjectRef::new(6, 0), PayloadKind::Stream, None, &truncated)
        .unwrap();
    assert_eq!(out, truncated);

    let good = manager.encrypt_string(ObjectRef::new(7, 0), b"(still readable)").unwrap();
    assert_eq!(
        manager.decrypt_string(ObjectRef::new(7, 0), &good).unwrap(),
        b"(still readable)".to_vec()
    );
}
