pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod model;
pub mod notify;
pub mod observe;
pub mod reminder;
pub mod session;
pub mod storage;
pub mod views;

pub use error::{AppError, AppResult};
pub use session::{Session, SessionOptions};
