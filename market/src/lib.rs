pub mod actions;
pub mod chat;
pub mod config;
pub mod envelope;
pub mod http_pool;
pub mod poller;
pub mod push_parser;
pub mod room_ws;
pub mod runner;
pub mod services;
pub mod session;

pub use chat::RoomDirectory;
pub use config::*;
pub use http_pool::{HttpPool, HttpResponse};
pub use room_ws::RoomWs;
pub use runner::Runner;
pub use services::HttpMarketplace;
pub use session::SessionStore;
