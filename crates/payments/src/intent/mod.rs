mod aggregate;
pub mod events;
mod state;

pub use aggregate::PaymentIntent;
pub use events::IntentEvent;
pub use state::IntentStatus;
