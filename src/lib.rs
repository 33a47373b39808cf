pub mod cli;
pub mod config;
pub mod intent;
pub mod logging;
pub mod pipeline;
pub mod policies;
pub mod policy;
