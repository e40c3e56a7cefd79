#![forbid(unsafe_code)]

pub mod chapters;
pub mod cli;
pub mod download;
pub mod fetch;
pub mod formats;
pub mod image_cache;
pub mod logging;
pub mod pdf;
pub mod select;
pub mod source;
