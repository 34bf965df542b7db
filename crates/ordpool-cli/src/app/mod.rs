pub mod config;
pub mod driver;
pub mod fib;
pub mod telemetry;
