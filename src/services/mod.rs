pub mod channel;
pub mod frames;
pub mod presentation;
pub mod reconciler;
pub mod state;
pub mod store;
pub mod transport;
