// Segment decryption: AES-CBC with a trailing length-byte pad.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

const ALLOWED_LENGTHS: [usize; 3] = [16, 24, 32];

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("key length must be 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("iv length must be 16, 24 or 32 bytes, got {0}")]
    InvalidIvLength(usize),
    #[error("misaligned ciphertext: {0} bytes is not a non-zero multiple of the block size")]
    MisalignedCiphertext(usize),
    #[error("padding length {pad} exceeds plaintext length {len}")]
    InvalidPadding { pad: usize, len: usize },
}

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Decrypts an AES-CBC segment and strips its padding.
///
/// The AES variant is selected by key length (16, 24 or 32 bytes). A
/// non-empty `iv` must have one of the same lengths; its first block is used.
/// An empty `iv` falls back to the first block of the key, which is what
/// legacy servers producing these playlists expect. It is not a sound IV
/// policy.
///
/// Padding removal reads the final byte as the pad length and drops that many
/// bytes without checking the pad bytes themselves.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CipherError> {
    if !ALLOWED_LENGTHS.contains(&key.len()) {
        return Err(CipherError::InvalidKeyLength(key.len()));
    }
    if !iv.is_empty() && !ALLOWED_LENGTHS.contains(&iv.len()) {
        return Err(CipherError::InvalidIvLength(iv.len()));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::MisalignedCiphertext(ciphertext.len()));
    }

    let iv = if iv.is_empty() {
        &key[..BLOCK_SIZE]
    } else {
        &iv[..BLOCK_SIZE]
    };

    let mut buffer = ciphertext.to_vec();
    match key.len() {
        16 => cbc_decrypt::<Aes128CbcDec>(key, iv, &mut buffer)?,
        24 => cbc_decrypt::<Aes192CbcDec>(key, iv, &mut buffer)?,
        _ => cbc_decrypt::<Aes256CbcDec>(key, iv, &mut buffer)?,
    }

    strip_padding(&mut buffer)?;
    Ok(buffer)
}

fn cbc_decrypt<D>(key: &[u8], iv: &[u8], buffer: &mut [u8]) -> Result<(), CipherError>
where
    D: KeyIvInit + BlockDecryptMut,
{
    let len = buffer.len();
    let decryptor =
        D::new_from_slices(key, iv).map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
    decryptor
        .decrypt_padded_mut::<NoPadding>(buffer)
        .map_err(|_| CipherError::MisalignedCiphertext(len))?;
    Ok(())
}

fn strip_padding(plaintext: &mut Vec<u8>) -> Result<(), CipherError> {
    let len = plaintext.len();
    let pad = plaintext.last().copied().unwrap_or_default() as usize;
    if pad > len {
        return Err(CipherError::InvalidPadding { pad, len });
    }
    plaintext.truncate(len - pad);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::{BlockEncryptMut, block_padding::Pkcs7};

    fn encrypt_with<E>(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8>
    where
        E: KeyIvInit + BlockEncryptMut,
    {
        let padded_len = plaintext.len() + (BLOCK_SIZE - plaintext.len() % BLOCK_SIZE);
        let mut buf = vec![0u8; padded_len];
        buf[..plaintext.len()].copy_from_slice(plaintext);
        E::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
            .unwrap()
            .to_vec()
    }

    fn encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
        let iv = if iv.is_empty() { &key[..16] } else { &iv[..16] };
        match key.len() {
            16 => encrypt_with::<cbc::Encryptor<Aes128>>(plaintext, key, iv),
            24 => encrypt_with::<cbc::Encryptor<Aes192>>(plaintext, key, iv),
            _ => encrypt_with::<cbc::Encryptor<Aes256>>(plaintext, key, iv),
        }
    }

    #[test]
    fn test_roundtrip_all_key_and_iv_lengths() {
        let plaintext = b"transport stream payload that spans more than one block";
        for key_len in ALLOWED_LENGTHS {
            let key: Vec<u8> = (0..key_len as u8).collect();
            for iv_len in [0, 16, 24, 32] {
                let iv: Vec<u8> = (0..iv_len as u8).map(|b| b.wrapping_mul(7)).collect();
                let ciphertext = encrypt(plaintext, &key, &iv);
                let decrypted = decrypt(&ciphertext, &key, &iv).unwrap();
                assert_eq!(decrypted, plaintext, "key {key_len} iv {iv_len}");
            }
        }
    }

    #[test]
    fn test_block_aligned_plaintext_gets_full_pad_block() {
        let key = [0x42u8; 16];
        let iv = [0x13u8; 16];
        let plaintext = [0xABu8; 32];

        let ciphertext = encrypt(&plaintext, &key, &iv);
        assert_eq!(ciphertext.len(), 48);
        assert_eq!(decrypt(&ciphertext, &key, &iv).unwrap(), plaintext);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let block = [0u8; 16];
        assert_eq!(
            decrypt(&block, &[0u8; 15], &[]),
            Err(CipherError::InvalidKeyLength(15))
        );
        assert_eq!(
            decrypt(&block, &[0u8; 16], &[0u8; 8]),
            Err(CipherError::InvalidIvLength(8))
        );
        assert_eq!(
            decrypt(&[0u8; 17], &[0u8; 16], &[]),
            Err(CipherError::MisalignedCiphertext(17))
        );
        assert_eq!(
            decrypt(&[], &[0u8; 16], &[]),
            Err(CipherError::MisalignedCiphertext(0))
        );
    }

    #[test]
    fn test_padding_bytes_are_not_validated() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        // Trailing byte says 3, the two bytes before it are not 3.
        let mut raw = vec![0x11u8; 13];
        raw.extend_from_slice(&[0xEE, 0xFF, 0x03]);
        let ciphertext = encrypt_with::<cbc::Encryptor<Aes128>>(&raw, &key, &iv);
        // Drop the Pkcs7 block appended by the helper so `raw` is the last block.
        let ciphertext = &ciphertext[..16];

        let decrypted = decrypt(ciphertext, &key, &iv).unwrap();
        assert_eq!(decrypted, vec![0x11u8; 13]);
    }

    #[test]
    fn test_zero_pad_keeps_everything_and_oversized_pad_fails() {
        let key = [1u8; 16];
        let iv = [2u8; 16];

        let mut zero_pad = vec![0x55u8; 15];
        zero_pad.push(0);
        let ciphertext = encrypt_with::<cbc::Encryptor<Aes128>>(&zero_pad, &key, &iv);
        assert_eq!(decrypt(&ciphertext[..16], &key, &iv).unwrap(), zero_pad);

        let mut oversized = vec![0x55u8; 15];
        oversized.push(200);
        let ciphertext = encrypt_with::<cbc::Encryptor<Aes128>>(&oversized, &key, &iv);
        assert_eq!(
            decrypt(&ciphertext[..16], &key, &iv),
            Err(CipherError::InvalidPadding { pad: 200, len: 16 })
        );
    }
}
