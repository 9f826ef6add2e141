pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod service;
pub mod state;
pub mod token;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use service::MessengerService;
pub use state::AppState;
