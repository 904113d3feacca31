pub mod capture;
pub mod cli;
pub mod config;
pub mod device;
pub mod input;
pub mod runtime;
pub mod shutdown;
pub mod sink;
