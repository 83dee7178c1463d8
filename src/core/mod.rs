pub mod config;
pub mod cors;
pub mod health;
pub mod rate_limit;
pub mod shared;
