//! Integration tests for the SecureTar decrypting reader.

mod common;

use common::*;
use flate2::read::GzDecoder;
use habackup::decrypt::BLOCK_SIZE;
use habackup::{derive_key, DecryptError, ExtractError, SecureTarReader};
use std::io::{Cursor, Read};

fn decrypt_all(ciphertext: Vec<u8>, password: &str) -> std::io::Result<Vec<u8>> {
    let key = derive_key(password).unwrap();
    let mut reader = SecureTarReader::new(Cursor::new(ciphertext), key);
    let mut plaintext = Vec::new();
    reader.read_to_end(&mut plaintext)?;
    Ok(plaintext)
}

#[test]
fn test_decrypt_recovers_padded_plaintext() {
    for len in [0usize, 1, 15, 16, 17, 255, 4096, 70_000] {
        let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

        for extended in [false, true] {
            let decrypted =
                decrypt_all(encrypt_member(&plaintext, PASSWORD, extended), PASSWORD).unwrap();

            let pad = BLOCK_SIZE - len % BLOCK_SIZE;
            assert_eq!(decrypted.len(), len + pad, "len {len}, extended {extended}");
            assert_eq!(&decrypted[..len], &plaintext[..]);
            assert!(decrypted[len..].iter().all(|&b| b as usize == pad));
        }
    }
}

#[test]
fn test_size_hint_from_extended_header() {
    let key = derive_key(PASSWORD).unwrap();
    let ciphertext = encrypt_member(&[7u8; 100], PASSWORD, true);
    let mut reader = SecureTarReader::new(Cursor::new(ciphertext), key);

    // The header is parsed on the first read
    assert_eq!(reader.plaintext_size_hint(), None);
    let mut first = [0u8; 32];
    reader.read_exact(&mut first).unwrap();
    assert_eq!(reader.plaintext_size_hint(), Some(100));
    assert_eq!(first, [7u8; 32]);
}

#[test]
fn test_decrypt_into_tar_stream() {
    let member = core_member();
    let ciphertext = encrypt_member(&member, PASSWORD, true);

    let key = derive_key(PASSWORD).unwrap();
    let reader = SecureTarReader::new(Cursor::new(ciphertext), key);
    let mut archive = tar::Archive::new(GzDecoder::new(reader));

    let mut names = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        if name == "data/configuration.yaml" {
            assert_eq!(content, "homeassistant:\n  name: Home\n");
        }
        names.push(name);
    }

    assert_eq!(
        names,
        vec!["data/configuration.yaml", "data/.storage/core.config"]
    );
}

#[test]
fn test_wrong_key_yields_garbage_not_error() {
    let plaintext = core_member();
    let decrypted =
        decrypt_all(encrypt_member(&plaintext, PASSWORD, false), WRONG_PASSWORD).unwrap();

    assert_ne!(&decrypted[..plaintext.len()], &plaintext[..]);

    // The gzip layer is what notices
    let mut gz = GzDecoder::new(Cursor::new(decrypted));
    assert!(gz.read_to_end(&mut Vec::new()).is_err());
}

#[test]
fn test_truncated_ciphertext_is_reported() {
    let mut ciphertext = encrypt_member(&[1u8; 64], PASSWORD, false);
    ciphertext.truncate(ciphertext.len() - 5);

    // Which check trips depends on how the caller sizes its reads
    let err = decrypt_all(ciphertext, PASSWORD).unwrap_err();
    assert!(matches!(
        ExtractError::from(err),
        ExtractError::Decrypt(
            DecryptError::CiphertextNotBlockAligned(_) | DecryptError::CiphertextTooShort(_)
        )
    ));
}

#[test]
fn test_header_only_stream() {
    let ciphertext = SALT.to_vec();
    assert!(decrypt_all(ciphertext, PASSWORD).unwrap().is_empty());

    let err = decrypt_all(SALT[..10].to_vec(), PASSWORD).unwrap_err();
    assert!(matches!(
        ExtractError::from(err),
        ExtractError::Decrypt(DecryptError::TruncatedHeader)
    ));
}
