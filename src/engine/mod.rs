pub mod healing;
pub mod prompt;
pub mod provider;
pub mod renderer;
pub mod repair;
pub mod session;
pub mod stage;
pub mod types;
pub mod workflow;
