pub mod app;
pub mod classify;
pub mod config;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod export;
pub mod failure;
pub mod index;
pub mod ledger;
pub mod output;
pub mod progress;
pub mod report;
pub mod runner;
pub mod session;
pub mod skip;
pub mod tool;
