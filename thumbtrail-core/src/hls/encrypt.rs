use super::Playlist;
use crate::{
    CancelFlag, Error, KeyMaterial, Result,
    cipher::{encrypt_bytes, write_atomic},
    error::IoContext,
};
use log::{debug, info};
use m3u8_rs::{Key, KeyMethod};
use rayon::prelude::*;
use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

/// Encrypts every segment of a clear `playlist` into `output_dir` and writes
/// a new playlist there whose first segment carries the key tag.
///
/// The source playlist and its segments are only read.
pub(crate) fn encrypt_playlist(
    playlist: &Playlist,
    output_dir: &Path,
    material: &KeyMaterial,
    key_uri: &str,
    cancel: &CancelFlag,
) -> Result<PathBuf> {
    if playlist.is_encrypted() {
        return Err(Error::Format(format!(
            "{} is already encrypted",
            playlist.location
        )));
    }

    if playlist.media.segments.is_empty() {
        return Err(Error::Format(format!("{} has no segments", playlist.location)));
    }

    let mut names = HashSet::new();
    let mut jobs = Vec::with_capacity(playlist.media.segments.len());

    for (i, segment) in playlist.media.segments.iter().enumerate() {
        if segment.byte_range.is_some() || segment.map.is_some() {
            return Err(Error::segment(
                i,
                &segment.uri,
                Error::Format("byte range and EXT-X-MAP segments cannot be encrypted".into()),
            ));
        }

        let source = playlist.location.join(&segment.uri)?;
        let name = source
            .file_name()
            .ok_or_else(|| Error::segment(i, &segment.uri, Error::Format("no file name".into())))?;

        if !names.insert(name.clone()) {
            return Err(Error::segment(
                i,
                &segment.uri,
                Error::Format(format!("duplicate segment file name {name}")),
            ));
        }

        let target = output_dir.join(&name);

        if let Some(source) = source.as_path()
            && same_file(source, &target)
        {
            return Err(Error::Configuration(format!(
                "output directory {} would overwrite source segment {}",
                output_dir.display(),
                source.display()
            )));
        }

        jobs.push((i, segment.uri.as_str(), source, name, target));
    }

    info!(
        "Encrypting {} segments into {}",
        jobs.len(),
        output_dir.display()
    );

    jobs.par_iter().try_for_each(|(i, uri, source, _, target)| {
        cancel.check()?;
        debug!("Encrypting segment {} {}", i, source);

        let data = source.read().map_err(|e| Error::segment(*i, uri, e))?;
        let encrypted = encrypt_bytes(material, &data);

        write_atomic(target, |writer| writer.write_all(&encrypted).at(target))
            .map_err(|e| Error::segment(*i, uri, e))
    })?;

    let mut media = playlist.media.clone();

    for (segment, (_, _, _, name, _)) in media.segments.iter_mut().zip(&jobs) {
        segment.uri = name.to_owned();
        segment.key = None;
    }

    media.segments[0].key = Some(Key {
        method: KeyMethod::AES128,
        uri: Some(key_uri.to_owned()),
        iv: Some(format!("0x{}", material.iv_hex())),
        keyformat: None,
        keyformatversions: None,
    });

    let name = playlist
        .location
        .file_name()
        .unwrap_or_else(|| "output.m3u8".to_owned());
    let path = output_dir.join(name);

    Playlist {
        location: path.clone().into(),
        media,
    }
    .write(&path)?;

    info!("Encrypted playlist written to {}", path.display());
    Ok(path)
}

pub(crate) fn same_file(source: &Path, target: &Path) -> bool {
    let (Some(source_dir), Some(target_dir)) = (source.parent(), target.parent()) else {
        return false;
    };
    let dir = |x: &Path| {
        if x.as_os_str().is_empty() {
            fs::canonicalize(".")
        } else {
            fs::canonicalize(x)
        }
    };

    match (dir(source_dir), dir(target_dir)) {
        (Ok(a), Ok(b)) => a == b && source.file_name() == target.file_name(),
        _ => false,
    }
}
