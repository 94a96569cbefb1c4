use super::{Playlist, SegmentCipher};
use crate::{
    CancelFlag, Error, KEY_LEN, KeyMaterial, Result,
    cipher::{decrypt_bytes, write_atomic},
    error::IoContext,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{fs::File, io, io::Write, path::Path};

/// Decrypts every segment of `playlist` and concatenates the clear bytes,
/// in playlist order, into `output`.
///
/// Segments are decrypted in parallel into a scratch directory that is
/// removed on every exit path. `output` only appears once all segments
/// succeeded.
pub(crate) fn decrypt_playlist(
    playlist: &Playlist,
    key: &[u8; KEY_LEN],
    iv: Option<[u8; KEY_LEN]>,
    output: &Path,
    cancel: &CancelFlag,
) -> Result<()> {
    let ciphers = playlist.segment_ciphers()?;

    if ciphers.is_empty() {
        return Err(Error::Format(format!("{} has no segments", playlist.location)));
    }

    if !ciphers.iter().any(|x| matches!(x, SegmentCipher::Aes128 { .. })) {
        return Err(Error::Format(format!(
            "{} has no AES-128 key tag, it is not an encrypted HLS stream",
            playlist.location
        )));
    }

    if iv.is_none()
        && ciphers
            .iter()
            .any(|x| matches!(x, SegmentCipher::Aes128 { iv: None, .. }))
    {
        warn!("No IV given and key tag has none, using media sequence numbers as IV");
    }

    let scratch = tempfile::Builder::new()
        .prefix(".thumbtrail-segments-")
        .tempdir()
        .at(std::env::temp_dir())?;

    info!(
        "Decrypting {} segments from {}",
        ciphers.len(),
        playlist.location
    );

    let parts = ciphers
        .par_iter()
        .enumerate()
        .map(|(i, cipher)| {
            cancel.check()?;

            let uri = &playlist.media.segments[i].uri;
            let source = playlist.segment_location(i)?;
            let part = scratch.path().join(format!("{i}.ts"));
            debug!("Decrypting segment {} {}", i, source);

            let data = source.read().map_err(|e| Error::segment(i, uri, e))?;
            let data = match cipher.iv(iv) {
                Some(segment_iv) => decrypt_bytes(&KeyMaterial::new(*key, segment_iv), &data)
                    .map_err(|e| Error::segment(i, uri, e))?,
                None => data,
            };

            write_atomic(&part, |writer| writer.write_all(&data).at(&part))
                .map_err(|e| Error::segment(i, uri, e))?;
            Ok(part)
        })
        .collect::<Result<Vec<_>>>()?;

    cancel.check()?;

    write_atomic(output, |writer| {
        for part in &parts {
            let mut file = File::open(part).at(part)?;
            io::copy(&mut file, writer).at(output)?;
        }

        Ok(())
    })?;

    info!("Joined {} segments into {}", parts.len(), output.display());
    Ok(())
}
