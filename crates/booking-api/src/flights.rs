//! Flight search and catalogue endpoints (public on the backend)

use session_core::ApiRequest;
use tracing::debug;

use crate::BookingApi;
use crate::error::{Error, Result};
use crate::model::{Airport, Flight, FlightSearch, Page, PopularDestination};

impl BookingApi {
    /// `GET /flights/search`. `page` is zero-based.
    pub async fn search_flights(
        &self,
        search: &FlightSearch,
        page: u32,
        size: u32,
    ) -> Result<Page<Flight>> {
        if search.origin_code.is_empty() || search.destination_code.is_empty() {
            return Err(Error::InvalidRequest(
                "origin and destination are required".into(),
            ));
        }
        if search.passengers == 0 {
            return Err(Error::InvalidRequest("at least one passenger is required".into()));
        }

        let request = ApiRequest::get("/flights/search")
            .query("originCode", &search.origin_code)
            .query("destinationCode", &search.destination_code)
            .query("departureDate", &search.departure_date)
            .query("passengers", search.passengers)
            .query("cabinClass", search.cabin_class.as_str())
            .query_opt("sortBy", search.sort_by.map(|s| s.as_str()))
            .query("page", page)
            .query("size", size);

        let results: Page<Flight> = self.client().json(&request).await?;
        debug!(
            origin = %search.origin_code,
            destination = %search.destination_code,
            found = results.total_elements,
            "flight search"
        );
        Ok(results)
    }

    /// `GET /flights/{id}`
    pub async fn flight(&self, id: i64) -> Result<Flight> {
        Ok(self
            .client()
            .json(&ApiRequest::get(format!("/flights/{id}")))
            .await?)
    }

    /// `GET /flights/airports`
    pub async fn airports(&self) -> Result<Vec<Airport>> {
        Ok(self
            .client()
            .json(&ApiRequest::get("/flights/airports"))
            .await?)
    }

    /// `GET /flights/popular-destinations`
    pub async fn popular_destinations(&self, limit: u32) -> Result<Vec<PopularDestination>> {
        Ok(self
            .client()
            .json(&ApiRequest::get("/flights/popular-destinations").query("limit", limit))
            .await?)
    }
}
