pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod relay;
pub mod validation;
