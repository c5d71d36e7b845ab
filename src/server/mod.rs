pub mod bootstrap;
pub mod error;
mod logging;
pub mod messages;
pub mod routes;
mod ws;

pub use bootstrap::{run_server, ServerConfig};
pub use error::RoomError;
pub use routes::{build_router, AppState};
