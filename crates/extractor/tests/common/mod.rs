//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use aes::Aes128;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use flate2::write::GzEncoder;
use flate2::Compression;
use habackup::decrypt::{BLOCK_SIZE, SECURETAR_MAGIC};
use habackup::derive_key;
use habackup::key::derive_iv;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const PASSWORD: &str = "XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX";
pub const WRONG_PASSWORD: &str = "AAAA-BBBB-CCCC-DDDD-EEEE-FFFF-0000";
pub const SALT: [u8; 16] = [
    0xcb, 0x1e, 0xaf, 0x15, 0x02, 0xb0, 0xe2, 0x88, 0xa8, 0x3d, 0xb0, 0x10, 0xd5, 0x1c, 0xbf, 0x07,
];

pub const PROTECTED_MANIFEST: &str = r#"{
    "slug": "a1b2c3d4",
    "version": 2,
    "name": "Full backup",
    "date": "2025-01-05T04:45:00.123456+00:00",
    "type": "full",
    "crypto": "aes128",
    "protected": true,
    "compressed": true
}"#;

pub const PLAIN_MANIFEST: &str = r#"{
    "slug": "e5f6a7b8",
    "version": 2,
    "name": "Unprotected backup",
    "type": "full",
    "crypto": null,
    "protected": false,
    "compressed": true
}"#;

/// Builds an uncompressed tar stream of regular files.
pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tar = tar::Builder::new(Vec::new());

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, name, &content[..]).unwrap();
    }

    tar.into_inner().unwrap()
}

/// Builds a gzip compressed tar stream of regular files.
pub fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes(files)).unwrap();
    encoder.finish().unwrap()
}

/// Encrypts `plaintext` the way protected backups store their inner archives.
///
/// The plaintext gets PKCS#7 padding; `extended` prepends the SecureTar
/// magic header with the plaintext size.
pub fn encrypt_member(plaintext: &[u8], password: &str, extended: bool) -> Vec<u8> {
    let key = derive_key(password).unwrap();
    let iv = derive_iv(&key, &SALT);

    let pad = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
    let mut data = plaintext.to_vec();
    data.extend(std::iter::repeat(pad as u8).take(pad));

    encrypt_blocks(&key, &iv, &mut data);

    let mut out = Vec::new();
    if extended {
        out.extend_from_slice(SECURETAR_MAGIC);
        out.extend((plaintext.len() as u64).to_be_bytes());
        out.extend([0u8; 8]);
    }
    out.extend(SALT);
    out.extend(data);
    out
}

/// Encrypts whole blocks in place with AES-128-CBC.
pub fn encrypt_blocks(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut encryptor = cbc::Encryptor::<Aes128>::new(&(*key).into(), &(*iv).into());
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Writes an outer backup tar with an optional manifest and the given members.
pub fn write_backup(
    dir: &Path,
    name: &str,
    manifest: Option<&str>,
    members: &[(&str, Vec<u8>)],
) -> PathBuf {
    write_backup_with_dirs(dir, name, &[], manifest, members)
}

/// Like [`write_backup`], with directory entries written first.
pub fn write_backup_with_dirs(
    dir: &Path,
    name: &str,
    dirs: &[&str],
    manifest: Option<&str>,
    members: &[(&str, Vec<u8>)],
) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    let mut tar = tar::Builder::new(file);

    for entry in dirs {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Directory);
        header.set_cksum();
        tar.append_data(&mut header, entry, std::io::empty()).unwrap();
    }

    let mut entries: Vec<(&str, &[u8])> = Vec::new();
    if let Some(manifest) = manifest {
        entries.push(("./backup.json", manifest.as_bytes()));
    }
    for (member, content) in members {
        entries.push((member, content.as_slice()));
    }

    for (entry, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, entry, content).unwrap();
    }

    tar.finish().unwrap();
    path
}

/// Content of the `homeassistant.tar.gz` member used across tests.
pub fn core_member() -> Vec<u8> {
    tar_gz_bytes(&[
        ("data/configuration.yaml", b"homeassistant:\n  name: Home\n"),
        ("data/.storage/core.config", b"{\"data\": {}}"),
    ])
}

/// Content of the `share.tar.gz` member used across tests.
pub fn share_member() -> Vec<u8> {
    tar_gz_bytes(&[("notes.txt", b"shared notes")])
}
