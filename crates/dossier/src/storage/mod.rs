pub mod filesystem;

pub use filesystem::{safe_filename, FileStorage};
