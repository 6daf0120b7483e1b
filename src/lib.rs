pub mod api;
pub mod config;
pub mod models;
pub mod recorder;
pub mod region;
pub mod storage;
