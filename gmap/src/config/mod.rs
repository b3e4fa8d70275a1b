mod gmap_config;

pub use gmap_config::GmapConfig;
