pub mod dedup;
pub mod extractor;
pub mod failed;
pub mod games;
pub mod profile;
pub mod search;
pub mod session;
pub mod sink;
pub mod stats;
pub mod status;
