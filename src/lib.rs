#![forbid(unsafe_code)]

pub mod browser;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod security;
pub mod uploader;
pub mod youtube;
