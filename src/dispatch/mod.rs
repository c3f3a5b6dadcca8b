//! Email provider dispatch.
//!
//! This module provides:
//! - The `HttpTransport` abstraction and its `reqwest` implementation
//! - Classification of provider responses into delivery outcomes
//! - `DispatchGateway`, which sends a message and logs the attempt

pub mod classify;
pub mod gateway;
pub mod transport;

pub use classify::{classify, Classification, MalformedResponse};
pub use gateway::{DispatchError, DispatchGateway, OutgoingEmail};
pub use transport::{
    HttpTransport, ProviderRequest, ProviderResponse, ReqwestTransport, TransportError,
};
