//! Decrypting reader for SecureTar members.
//!
//! An encrypted member starts with a 16 byte salt, optionally preceded by an
//! extended header:
//!
//! ```text
//! +------------------+---------------------------+-----------+----------------+
//! | "SecureTar\x02"  | plaintext size (u64 BE)   | salt (16) | AES-128-CBC    |
//! | + 6 zero bytes   | + 8 unused bytes          |           | ciphertext ... |
//! +------------------+---------------------------+-----------+----------------+
//! ```
//!
//! The IV is derived from the key and salt (see [`derive_iv`]). The reader
//! decrypts whole blocks in place and never strips padding; gzip and tar stop
//! on their own end markers.

use crate::error::DecryptError;
use crate::key::{derive_iv, Key, KEY_SIZE};
use aes::Aes128;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use std::io::{self, Read};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// First block of a member carrying the extended SecureTar header.
pub const SECURETAR_MAGIC: &[u8; BLOCK_SIZE] = b"SecureTar\x02\x00\x00\x00\x00\x00\x00";

/// Stream transformer turning an encrypted member into plaintext.
///
/// The header is consumed on the first call to [`Read::read`]. Every later
/// read pulls at most the caller's buffer size (rounded down to whole blocks)
/// from the source and decrypts it in place; a source read that is not a
/// whole number of blocks fails with [`DecryptError`].
///
/// Exclusive access through `&mut self` keeps the CBC chaining state
/// consistent, so one reader serves one member.
pub struct SecureTarReader<R> {
    inner: R,
    key: Key,
    decryptor: Option<Aes128CbcDec>,
    size_hint: Option<u64>,
    // Plaintext left over when the caller's buffer is smaller than a block.
    spill: [u8; BLOCK_SIZE],
    spill_pos: usize,
    spill_len: usize,
}

impl<R: Read> SecureTarReader<R> {
    pub fn new(inner: R, key: Key) -> Self {
        Self {
            inner,
            key,
            decryptor: None,
            size_hint: None,
            spill: [0u8; BLOCK_SIZE],
            spill_pos: 0,
            spill_len: 0,
        }
    }

    /// Plaintext size announced by the extended header, once it was read.
    ///
    /// Informational only, reads are not bounded by it.
    pub fn plaintext_size_hint(&self) -> Option<u64> {
        self.size_hint
    }
}

impl<R: Read> Read for SecureTarReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.spill_pos < self.spill_len {
            let n = (self.spill_len - self.spill_pos).min(buf.len());
            buf[..n].copy_from_slice(&self.spill[self.spill_pos..self.spill_pos + n]);
            self.spill_pos += n;
            return Ok(n);
        }

        let decryptor = match &mut self.decryptor {
            Some(decryptor) => decryptor,
            None => {
                let (decryptor, size_hint) = read_header(&mut self.inner, &self.key)?;
                self.size_hint = size_hint;
                self.decryptor.insert(decryptor)
            }
        };

        if buf.len() < BLOCK_SIZE {
            let n = read_blocks(&mut self.inner, decryptor, &mut self.spill)?;
            let take = n.min(buf.len());
            buf[..take].copy_from_slice(&self.spill[..take]);
            self.spill_pos = take;
            self.spill_len = n;
            return Ok(take);
        }

        let len = buf.len() - buf.len() % BLOCK_SIZE;
        read_blocks(&mut self.inner, decryptor, &mut buf[..len])
    }
}

/// Parses the salt (and extended header) and sets up the CBC context.
fn read_header<R: Read>(inner: &mut R, key: &Key) -> io::Result<(Aes128CbcDec, Option<u64>)> {
    let mut salt = [0u8; KEY_SIZE];
    read_header_block(inner, &mut salt)?;

    let mut size_hint = None;
    if &salt == SECURETAR_MAGIC {
        let mut info = [0u8; BLOCK_SIZE];
        read_header_block(inner, &mut info)?;

        let mut size = [0u8; 8];
        size.copy_from_slice(&info[..8]);
        size_hint = Some(u64::from_be_bytes(size));

        read_header_block(inner, &mut salt)?;
    }

    let iv = derive_iv(key, &salt);
    tracing::trace!(?size_hint, "container header parsed");

    Ok((Aes128CbcDec::new(&(*key).into(), &iv.into()), size_hint))
}

fn read_header_block<R: Read>(inner: &mut R, block: &mut [u8; BLOCK_SIZE]) -> io::Result<()> {
    inner.read_exact(block).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecryptError::TruncatedHeader.into()
        } else {
            err
        }
    })
}

/// One source read, validated and decrypted in place.
fn read_blocks<R: Read>(
    inner: &mut R,
    decryptor: &mut Aes128CbcDec,
    buf: &mut [u8],
) -> io::Result<usize> {
    let n = loop {
        match inner.read(buf) {
            Ok(n) => break n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    };

    if n == 0 {
        return Ok(0);
    }
    if n < BLOCK_SIZE {
        return Err(DecryptError::CiphertextTooShort(n).into());
    }
    if n % BLOCK_SIZE != 0 {
        return Err(DecryptError::CiphertextNotBlockAligned(n).into());
    }

    for block in buf[..n].chunks_exact_mut(BLOCK_SIZE) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }

    Ok(n)
}
