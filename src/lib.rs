pub mod can;
pub mod config;
pub mod messages;
pub mod motor;
pub mod peripherals;
pub mod runtime;
