pub mod check;
pub mod config;
pub mod export;
pub mod simulate;
