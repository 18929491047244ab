//! Positions: records, store, operation serializer, and controller.

pub mod controller;
pub mod serializer;
pub mod store;
pub mod types;

pub use controller::Ctx;
pub use serializer::OpQueue;
pub use store::PositionStore;
pub use types::{OrderStatus, Position, PositionPatch, PositionSpec, Status};
