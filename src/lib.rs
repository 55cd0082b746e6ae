pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod importers;
pub mod models;
pub mod services;
