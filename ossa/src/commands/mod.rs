//! Command implementations for the ossa CLI

pub mod demo;
pub mod info;
pub mod pose;
pub mod probe;
