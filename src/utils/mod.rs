pub mod key;

pub use key::{derive_key, normalize_url};
