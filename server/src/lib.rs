pub mod config;
pub mod data;
pub mod db;
pub mod fsops;
pub mod handlers;
pub mod types;

pub use config::*;
pub use data::ServerCtx;
