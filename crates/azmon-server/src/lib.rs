pub mod app;
pub mod config;
pub mod exposition;
pub mod logging;
pub mod state;
