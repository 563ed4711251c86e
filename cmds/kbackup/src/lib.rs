pub mod backup;
pub mod commands;
pub mod config;
pub mod k8s;
pub mod layout;
pub mod registry;
pub mod sanitize;
pub mod secrets;
pub mod telemetry;
pub mod yaml;
