#![deny(warnings)]

pub mod clip;
pub mod config;
pub mod decode;
pub mod emotion;
pub mod features;
pub mod pipeline;
