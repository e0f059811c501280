pub mod acquisition;
pub mod app;
pub mod archive;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod fs_util;
pub mod groups;
pub mod hits;
pub mod output;
pub mod reference;
pub mod retry;
pub mod threshold;
