//! Markets: domain types, exchange client, reference data, and test mock.

pub mod client;
pub mod mock;
pub mod refdata;
pub mod types;

pub use client::ExchangeClient;
pub use mock::MockExchange;
pub use refdata::{RefRecord, ReferenceData};
pub use types::{DeltaStatus, MakerOrder, MarketId, OrderDelta, OrderId, Outcome, PositionId, WireOrder};
