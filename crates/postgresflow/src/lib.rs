pub mod config;
pub mod db;
pub mod enqueue;
pub mod handler;
pub mod jobs;
pub mod telemetry;
