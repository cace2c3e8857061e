//! Event-driven observability for the council
//!
//! - `types`: the `CouncilEvent` variants
//! - `bus`: Tokio broadcast pub/sub with filtered subscriptions
//!
//! # Usage
//!
//! ```ignore
//! use sage_coordination::events::{EventBus, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut receiver = bus.subscribe_filtered(EventFilter::new().types(vec!["session_ended"]));
//!
//! // ... run a session with this bus ...
//! let event = receiver.recv().await?;
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::CouncilEvent;
