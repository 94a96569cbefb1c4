//! AES-128-CBC with PKCS#7 padding over whole files and in-memory buffers.
//!
//! There is no authentication tag. The only integrity signal on decryption
//! is padding validity, so a wrong IV goes unnoticed (CBC only garbles the
//! first block) and a wrong key is caught with high but not total
//! probability.

use crate::{Error, KeyMaterial, Result, error::IoContext};
use aes::{
    Block,
    cipher::{
        BlockDecryptMut, BlockEncryptMut, KeyIvInit,
        block_padding::{Padding, Pkcs7},
    },
};
use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::Path,
};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const BLOCK_LEN: usize = 16;
const BUFFER_SIZE: usize = 1024 * 1024 * 2; // 2 MiB

/// Encrypts everything from `reader` into `writer`, returns bytes written.
pub fn encrypt_stream<R: Read, W: Write>(
    material: &KeyMaterial,
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<u64> {
    let mut encryptor = Aes128CbcEnc::new(material.key().into(), material.iv().into());
    let mut buf = vec![0; BUFFER_SIZE];
    let mut written = 0;

    loop {
        let filled = read_full(reader, &mut buf)?;
        let whole = filled - (filled % BLOCK_LEN);

        for chunk in buf[..whole].chunks_exact_mut(BLOCK_LEN) {
            encryptor.encrypt_block_mut(Block::from_mut_slice(chunk));
        }

        writer.write_all(&buf[..whole])?;
        written += whole as u64;

        if filled < buf.len() {
            let mut last = Block::default();
            let tail = filled - whole;
            last[..tail].copy_from_slice(&buf[whole..filled]);
            Pkcs7::pad(&mut last, tail);
            encryptor.encrypt_block_mut(&mut last);
            writer.write_all(&last)?;
            written += BLOCK_LEN as u64;
            break;
        }
    }

    writer.flush()?;
    Ok(written)
}

/// Decrypts everything from `reader` into `writer`, returns bytes written.
///
/// Fails with [`Error::Integrity`] when the ciphertext is not block aligned
/// or the final padding is invalid. Bytes preceding the last block may
/// already be written when that happens.
pub fn decrypt_stream<R: Read, W: Write>(
    material: &KeyMaterial,
    reader: &mut R,
    writer: &mut W,
) -> Result<u64> {
    let io = |e: std::io::Error| Error::io("<stream>", e);
    let mut decryptor = Aes128CbcDec::new(material.key().into(), material.iv().into());
    let mut buf = vec![0; BUFFER_SIZE];
    let mut pending: Option<Block> = None;
    let mut total = 0_u64;
    let mut written = 0_u64;

    loop {
        let filled = read_full(reader, &mut buf).map_err(io)?;
        total += filled as u64;

        if filled % BLOCK_LEN != 0 {
            return Err(Error::Integrity(format!(
                "ciphertext length is not a multiple of {BLOCK_LEN} bytes"
            )));
        }

        if filled > 0 {
            // Emit the held back block, keep the newest one for unpadding.
            if let Some(block) = pending.take() {
                writer.write_all(&block).map_err(io)?;
                written += BLOCK_LEN as u64;
            }

            let whole = filled - BLOCK_LEN;

            for chunk in buf[..filled].chunks_exact_mut(BLOCK_LEN) {
                decryptor.decrypt_block_mut(Block::from_mut_slice(chunk));
            }

            writer.write_all(&buf[..whole]).map_err(io)?;
            written += whole as u64;
            pending = Some(*Block::from_slice(&buf[whole..filled]));
        }

        if filled < buf.len() {
            break;
        }
    }

    let last = pending
        .ok_or_else(|| Error::Integrity(format!("ciphertext is empty ({total} bytes)")))?;
    let plain = Pkcs7::unpad(&last)
        .map_err(|_| Error::Integrity("invalid padding (wrong key or not encrypted)".into()))?;

    writer.write_all(plain).map_err(io)?;
    writer.flush().map_err(io)?;
    Ok(written + plain.len() as u64)
}

pub fn encrypt_bytes(material: &KeyMaterial, data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + BLOCK_LEN);
    let mut reader = data;
    // Reading from a slice and writing to a vec cannot fail.
    let _ = encrypt_stream(material, &mut reader, &mut output);
    output
}

pub fn decrypt_bytes(material: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len());
    let mut reader = data;
    decrypt_stream(material, &mut reader, &mut output)?;
    Ok(output)
}

/// Encrypts `input` into `output` as a single CBC stream.
pub fn encrypt_file<I: AsRef<Path>, O: AsRef<Path>>(
    input: I,
    output: O,
    material: &KeyMaterial,
) -> Result<u64> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut reader = File::open(input).at(input)?;

    write_atomic(output, |writer| {
        encrypt_stream(material, &mut reader, writer).at(input)
    })
}

/// Decrypts `input` into `output`. Nothing is left at `output` on failure.
pub fn decrypt_file<I: AsRef<Path>, O: AsRef<Path>>(
    input: I,
    output: O,
    material: &KeyMaterial,
) -> Result<u64> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut reader = File::open(input).at(input)?;

    write_atomic(output, |writer| {
        decrypt_stream(material, &mut reader, writer).map_err(|e| match e {
            Error::Integrity(reason) => {
                Error::Integrity(format!("{}: {}", input.display(), reason))
            }
            Error::Io { source, .. } => Error::io(input, source),
            e => e,
        })
    })
}

/// Writes through `<output>.part` and renames it into place once `f` succeeded.
pub(crate) fn write_atomic<F, T>(output: &Path, f: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T>,
{
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).at(parent)?;
    }

    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    let part = Path::new(&part);

    let result = File::create(part).at(part).and_then(|file| {
        let mut writer = BufWriter::new(file);
        let value = f(&mut writer)?;
        writer.flush().at(part)?;
        Ok(value)
    });

    match result {
        Ok(value) => {
            fs::rename(part, output).at(output)?;
            Ok(value)
        }
        Err(e) => {
            let _ = fs::remove_file(part);
            Err(e)
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_IV;

    fn material() -> KeyMaterial {
        KeyMaterial::new([7; 16], [9; 16])
    }

    #[test]
    fn test_bytes_roundtrip_around_block_boundaries() {
        for len in [0_usize, 1, 15, 16, 17, 31, 32, 1000] {
            let data = (0..len).map(|x| x as u8).collect::<Vec<_>>();
            let encrypted = encrypt_bytes(&material(), &data);
            assert_eq!(encrypted.len(), (len / 16 + 1) * 16);
            assert_eq!(decrypt_bytes(&material(), &encrypted).unwrap(), data);
        }
    }

    #[test]
    fn test_matches_one_shot_cbc() {
        let data = b"thumbtrail sample payload";
        let mut buf = [0; 32];
        buf[..data.len()].copy_from_slice(data);
        let expected = Aes128CbcEnc::new((&[7; 16]).into(), (&[9; 16]).into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
            .unwrap()
            .to_vec();
        assert_eq!(encrypt_bytes(&material(), data), expected);
    }

    #[test]
    fn test_multi_chunk_stream() {
        let data = vec![0x5a; BUFFER_SIZE * 2 + 5];
        let encrypted = encrypt_bytes(&material(), &data);
        assert_eq!(decrypt_bytes(&material(), &encrypted).unwrap(), data);

        let aligned = vec![0x11; BUFFER_SIZE];
        let encrypted = encrypt_bytes(&material(), &aligned);
        assert_eq!(encrypted.len(), BUFFER_SIZE + 16);
        assert_eq!(decrypt_bytes(&material(), &encrypted).unwrap(), aligned);
    }

    #[test]
    fn test_wrong_key_is_integrity_error() {
        let encrypted = encrypt_bytes(&material(), b"some clear video bytes");
        let wrong = KeyMaterial::new([8; 16], [9; 16]);
        let result = decrypt_bytes(&wrong, &encrypted);
        assert!(matches!(result, Err(Error::Integrity(_))));
    }

    #[test]
    fn test_unaligned_or_empty_ciphertext() {
        assert!(matches!(
            decrypt_bytes(&material(), &[1, 2, 3]),
            Err(Error::Integrity(_))
        ));
        assert!(matches!(
            decrypt_bytes(&material(), &[]),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn test_file_roundtrip_and_no_output_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("video.mp4");
        let encrypted = dir.path().join("aes/encrypted_video.mp4");
        let decrypted = dir.path().join("aes/decrypted_video.mp4");
        let data = (0..70_000).map(|x| (x % 251) as u8).collect::<Vec<_>>();
        fs::write(&input, &data).unwrap();

        let material = KeyMaterial::new([3; 16], DEFAULT_IV);
        encrypt_file(&input, &encrypted, &material).unwrap();
        decrypt_file(&encrypted, &decrypted, &material).unwrap();
        assert_eq!(fs::read(&decrypted).unwrap(), data);

        let failed = dir.path().join("aes/failed.mp4");
        let result = decrypt_file(&input, &failed, &material);
        assert!(result.unwrap_err().is_integrity());
        assert!(!failed.exists());
        assert!(!dir.path().join("aes/failed.mp4.part").exists());
    }
}
