pub mod cli;
pub mod config;
pub mod datasource;
pub mod detector;
pub mod manager;
pub mod models;
