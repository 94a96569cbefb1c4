//! HLS media playlists: parsing, per-segment key resolution, retrofitting
//! AES-128 onto a clear playlist and joining decrypted segments.

mod decrypt;
mod encrypt;
mod playlist;

pub(crate) use decrypt::decrypt_playlist;
pub(crate) use encrypt::{encrypt_playlist, same_file};
pub use playlist::{Playlist, SegmentCipher};
