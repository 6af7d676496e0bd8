//! Customize Ubuntu installer ISOs.
//!
//! A run takes a source image (a local file or a downloaded release), adds a
//! directory tree under ISO9660, Joliet and Rock Ridge names, optionally
//! swaps the GRUB menu, and writes a new image.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod iso;
pub mod utils;

pub use config::BuildConfig;
pub use error::{Error, Result};
