pub mod client;
pub mod endpoint;
pub mod event;
pub mod keys;
pub mod message;
pub mod relay_connection;
pub mod sifter;
pub mod subscription;
