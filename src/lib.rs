#![forbid(unsafe_code)]

pub mod app;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod menu_links;
pub mod preprocess;
pub mod record;
pub mod sink;
