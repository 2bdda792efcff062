pub mod lock;
pub mod sanitize;
pub mod uploader;
