pub mod api;
pub mod archiver;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod partition;
pub mod storage;
pub mod writer;
