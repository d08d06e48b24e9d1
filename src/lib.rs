//! Mask-stock dashboard service for Macao points of interest.

pub mod aggregate;
pub mod config;
pub mod observation;
pub mod output;
pub mod provider;
pub mod server;
pub mod source;
