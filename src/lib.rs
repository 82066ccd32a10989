pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod params;
pub mod request;
pub mod response;
pub mod signals;
pub mod templates;
