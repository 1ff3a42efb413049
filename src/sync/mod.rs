pub mod api_client;
pub mod engine;
pub mod error;
pub mod handle;
pub mod history_sync;
pub mod http_channel;
pub mod migration;
pub mod offline_queue;
pub mod remote;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod ws_client;
