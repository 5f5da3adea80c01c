pub mod config;
pub mod enhance_routes;
mod http_layers;
pub mod metrics;
pub mod server;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
