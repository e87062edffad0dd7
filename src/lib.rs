pub mod common;
pub mod configs;
pub mod gateway;
pub mod notify;
pub mod player;
pub mod protocol;
pub mod server;
pub mod sources;
pub mod storage;
pub mod transport;
pub mod voice;
