mod gmap_error;

pub use gmap_error::GmapError;
pub type Result<T> = std::result::Result<T, GmapError>;
