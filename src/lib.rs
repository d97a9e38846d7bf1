#![forbid(unsafe_code)]

pub mod cli;
pub mod formats;
pub mod linkedin;
pub mod logging;
pub mod openai;
pub mod score;
pub mod scrape;
pub mod store;
pub mod viewer;
