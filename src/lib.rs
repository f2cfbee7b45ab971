pub mod config;
pub mod net;
pub mod options;
pub mod sim;
