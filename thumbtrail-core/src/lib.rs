#![cfg_attr(docsrs, feature(doc_cfg))]

//! AES-128 protection for video files and HLS streams, plus thumbnail
//! scrubbing tracks (sprite sheets and WebVTT) generated from clear or
//! encrypted sources.
//!
//! Media work (segmenting, remuxing, probing, frame grabbing) is delegated
//! to a [`Transcoder`], [`Ffmpeg`] in production.
//!
//! # Optional Features
//!
//! The following are a list of [Cargo features](https://doc.rust-lang.org/stable/cargo/reference/features.html#the-features-section) that can be
//! enabled or disabled:
//!
//! - **native-tls** (default): fetch remote playlists and segments with the platform tls stack.
//! - **rustls-tls-native-roots**: use rustls with the platform root certificates.
//! - **rustls-tls-webpki-roots**: use rustls with the webpki root certificates.

mod cancel;
pub mod cipher;
mod engine;
mod error;
pub mod hls;
mod keyinfo;
mod keys;
mod location;
pub mod scrubber;
pub mod transcoder;

pub use cancel::CancelFlag;
pub use engine::{
    CryptoEngine, EncryptedHls, HLS_IV_FILE, HLS_KEY_FILE, HLS_KEY_INFO_FILE, HlsKey,
};
pub use error::{Error, Result};
pub use keyinfo::KeyInfo;
pub use keys::{DEFAULT_IV, KEY_LEN, KeyMaterial, parse_hex_16, read_raw};
pub use location::Location;
pub use scrubber::{
    Decryption, ImageFormat, Region, Scrubber, Thumbnail, ThumbnailOptions, ThumbnailSet,
};
pub use transcoder::{Ffmpeg, HlsOptions, Size, Transcoder};
