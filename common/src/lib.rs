pub mod caption;
pub mod config;
pub mod frame;
pub mod style;
