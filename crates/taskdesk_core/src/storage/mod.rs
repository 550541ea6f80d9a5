pub mod json_store;
pub mod snapshot;

pub use json_store::JsonFileGateway;
