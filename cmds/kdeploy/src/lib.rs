pub mod commands;
pub mod config;
pub mod deploy;
pub mod k8s;
pub mod telemetry;
