//! Typed client for the booking backend
//!
//! Thin wrappers over `session_core::ApiClient`: every call inherits bearer
//! attachment and refresh-and-retry. Fare computation, inventory and payment
//! settlement all happen server-side; this crate only shapes requests and
//! decodes responses.

pub mod bookings;
pub mod card;
pub mod error;
pub mod flights;
pub mod model;
pub mod payments;
pub mod pricing;

use std::sync::Arc;

use session_core::ApiClient;

pub use card::{CardBrand, detect_brand, luhn_valid, validate_card_number};
pub use error::{Error, Result};
pub use model::*;

/// Entry point for the booking endpoints.
#[derive(Clone)]
pub struct BookingApi {
    client: Arc<ApiClient>,
}

impl BookingApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}
