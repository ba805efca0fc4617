//! Data model and configuration types shared between growlink and the
//! backend persistence API.

pub mod config;
pub mod entity;
pub mod gateway;
pub mod grow;
pub mod stage;

pub use entity::{EntityUpdate, LinkRequest, LinkedEntity, NewEntity};
pub use gateway::{Gateway, GatewayUpdate};
pub use grow::Grow;
pub use stage::{Stage, StageParseError};

pub type GatewayId = i64;
pub type GrowId = i64;
pub type RecordId = i64;
