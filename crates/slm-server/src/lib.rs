pub mod error;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{app_config, run_server, ServerConfig};
pub use state::AppState;
