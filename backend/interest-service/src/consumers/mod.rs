pub mod interaction_events;

pub use interaction_events::{InteractionEventsConsumer, InteractionEventsConsumerConfig};
