pub mod config;
pub mod connection;
pub mod registry;
pub mod rng;
pub mod room;
pub mod server;
pub mod solver;
pub mod tile;

pub use server::{build_router, run_server, ServerConfig};
