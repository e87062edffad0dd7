//! Sync gateway: viewer authentication, subscriptions, and message routing.

pub mod auth;
pub mod dispatch;
pub mod hub;

pub use auth::{AuthToken, TokenStore};
pub use hub::{Binding, ConnectionId, SubscriberHub};
