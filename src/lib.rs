pub mod adjustments;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod history;
pub mod masks;
pub mod session;
pub mod store;
pub mod viewport;
pub mod tasks {
    pub mod persist;
    pub mod scheduler;
    pub mod viewport;
}

pub use error::{Error, SessionError};
