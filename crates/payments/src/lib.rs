//! Payment coordination for marketplace orders.
//!
//! A [`PaymentIntent`] is an event-sourced record of one attempt to pay one
//! order through an external [`PaymentProvider`]. The [`PaymentCoordinator`]
//! creates intents, applies provider callbacks and records the payment on
//! the order at most once, however often the provider retries.
//!
//! Flow:
//! 1. `create_payment_intent` validates the order, persists a `CREATED`
//!    intent and asks the provider for an approval URL
//! 2. the customer approves at the provider, which calls back
//! 3. `handle_provider_callback` verifies with the provider, records the
//!    payment on the order and marks the intent `VERIFIED`
//!
//! Stale `CREATED` intents are expired by a background sweeper.

pub mod coordinator;
pub mod error;
pub mod intent;
pub mod provider;
pub mod retry;
pub mod sweeper;

pub use coordinator::{
    CallbackOutcome, CallbackReceipt, CoordinatorSettings, CreatePaymentIntent,
    PaymentCoordinator, ProviderCallback,
};
pub use error::PaymentError;
pub use intent::{IntentEvent, IntentStatus, PaymentIntent};
pub use provider::{
    FakePaymentProvider, PaymentProvider, ProviderError, ProviderIntent, Verification,
};
pub use retry::RetryPolicy;
pub use sweeper::spawn_expiry_sweeper;
