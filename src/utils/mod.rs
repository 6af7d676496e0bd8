pub mod fs;
pub mod net;

pub use net::{check_local_iso, download_iso};
