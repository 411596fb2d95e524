pub mod build_info;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod observe;
pub mod output;
pub mod payment;
pub mod reconcile;
pub mod store;
pub mod tasks;
pub mod upgrade;
