pub mod clipboard;
pub mod commands;
pub mod config;
pub mod identity;
pub mod logging;
pub mod storage;
pub mod sync;
