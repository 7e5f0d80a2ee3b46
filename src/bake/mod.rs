pub mod baker;
pub mod config;
