pub mod backend;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod mic;
pub mod resources;
pub mod server;
pub mod transcript;
