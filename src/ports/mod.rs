pub mod static_files;

pub use static_files::{CachePolicy, StaticFileError, StaticFileResult, StaticFiles};
