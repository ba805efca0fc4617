pub mod bulk;
pub mod config;
pub mod control;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod model;
pub mod normalize;
pub mod poll;
pub mod present;
pub mod registry;
pub mod selection;
pub mod session;

#[cfg(test)]
mod testutil;
