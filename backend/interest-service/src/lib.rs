pub mod config;
pub mod consumers;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{InterestError, Result};
pub use services::{EventDispatcher, ProfileStore, RecommendationEngine};
