//! Dynamic pricing endpoint (public on the backend)

use session_core::ApiRequest;

use crate::BookingApi;
use crate::error::Result;
use crate::model::{CabinClass, DynamicPrice};

impl BookingApi {
    /// `GET /pricing/flights/{flightId}?cabinClass&bookingDate`. Without a
    /// booking date the backend prices for today.
    pub async fn dynamic_price(
        &self,
        flight_id: i64,
        cabin_class: CabinClass,
        booking_date: Option<&str>,
    ) -> Result<DynamicPrice> {
        let request = ApiRequest::get(format!("/pricing/flights/{flight_id}"))
            .query("cabinClass", cabin_class.as_str())
            .query_opt("bookingDate", booking_date);
        Ok(self.client().json(&request).await?)
    }
}
