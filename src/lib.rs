pub mod audio;
pub mod config;
pub mod credentials;
pub mod db;
pub mod device;
pub mod environment;
pub mod errors;
pub mod fields;
pub mod gateway;
pub mod location;
pub mod normalization;
pub mod query;
pub mod recording;
pub mod store;
pub mod tag;
pub mod timestamps;
pub mod user;

/// Primary key of every table.
pub type Id = i32;
