pub mod charts;
pub mod config;
pub mod error;
pub mod forms;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;
pub mod submission;
pub mod views;

pub use routes::router;
