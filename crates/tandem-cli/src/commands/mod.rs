pub mod common;
pub mod completions;
pub mod config;
pub mod file;
pub mod site;
pub mod sync;
