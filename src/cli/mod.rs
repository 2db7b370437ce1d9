pub mod app;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod key;
pub mod nav;
pub mod output;
pub mod runtime;
pub mod sanitize;
