//! Booking endpoints (authenticated)

use session_core::ApiRequest;
use tracing::info;

use crate::BookingApi;
use crate::error::{Error, Result};
use crate::model::{BookingDetail, BookingResponse, CancelBookingRequest, CreateBookingRequest, Page};

/// Booking references and transaction ids are short codes of letters,
/// digits, `-` and `_`; anything else would change the request path.
pub(crate) fn check_reference(reference: &str) -> Result<()> {
    if reference.is_empty()
        || !reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidRequest(format!(
            "malformed reference: {reference:?}"
        )));
    }
    Ok(())
}

impl BookingApi {
    /// `POST /bookings`
    pub async fn create_booking(&self, request: &CreateBookingRequest) -> Result<BookingResponse> {
        if request.passengers.is_empty() {
            return Err(Error::InvalidRequest("a booking needs at least one passenger".into()));
        }
        if request.contact_email.trim().is_empty() {
            return Err(Error::InvalidRequest("contact email is required".into()));
        }

        let api_request = ApiRequest::post("/bookings")
            .json(request)
            .map_err(Error::Api)?;
        let booking: BookingResponse = self.client().json(&api_request).await?;
        info!(
            reference = %booking.booking_reference,
            flight_id = request.flight_id,
            passengers = request.passengers.len(),
            "booking created"
        );
        Ok(booking)
    }

    /// `GET /bookings/{reference}`
    pub async fn booking(&self, reference: &str) -> Result<BookingDetail> {
        check_reference(reference)?;
        Ok(self
            .client()
            .json(&ApiRequest::get(format!("/bookings/{reference}")))
            .await?)
    }

    /// `GET /bookings/my?page&size`. `page` is zero-based.
    pub async fn my_bookings(&self, page: u32, size: u32) -> Result<Page<BookingDetail>> {
        let request = ApiRequest::get("/bookings/my")
            .query("page", page)
            .query("size", size);
        Ok(self.client().json(&request).await?)
    }

    /// `POST /bookings/{reference}/cancel`
    pub async fn cancel_booking(&self, reference: &str, reason: Option<String>) -> Result<()> {
        check_reference(reference)?;
        let request = ApiRequest::post(format!("/bookings/{reference}/cancel"))
            .json(&CancelBookingRequest { reason })
            .map_err(Error::Api)?;
        self.client().empty(&request).await?;
        info!(reference, "booking cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::{get, post};

    use super::*;
    use crate::model::{BookingStatus, CabinClass, Gender, PassengerInfo, PaymentStatus};
    use crate::testing::api_with;

    fn passenger() -> PassengerInfo {
        PassengerInfo {
            first_name: "Aziza".into(),
            last_name: "Karimova".into(),
            date_of_birth: "1991-04-12".into(),
            gender: Gender::Female,
            nationality: "UZ".into(),
            passport_number: "FA1234567".into(),
            passport_country: "UZ".into(),
            passport_expiry: "2031-04-11".into(),
            cabin_class: None,
            seat_number: Some("12A".into()),
            seat_preference: None,
        }
    }

    fn create_request() -> CreateBookingRequest {
        CreateBookingRequest {
            flight_id: 7,
            default_cabin_class: Some(CabinClass::Economy),
            passengers: vec![passenger()],
            contact_email: "aziza@example.com".into(),
            contact_phone: "+998901234567".into(),
            special_requests: None,
        }
    }

    fn detail_json(reference: &str) -> serde_json::Value {
        serde_json::json!({
            "bookingReference": reference,
            "status": "CONFIRMED",
            "paymentStatus": "COMPLETED",
            "totalAmount": 500.0,
            "contactInfo": { "email": "aziza@example.com", "phone": "+998901234567" },
            "tickets": [{
                "ticketNumber": "250-0000000001",
                "flightNumber": "HY 7",
                "origin": "TAS",
                "destination": "DXB",
                "departureTime": "2026-12-01T09:00:00",
                "cabinClass": "ECONOMY",
                "seatNumber": "12A",
            }],
        })
    }

    #[tokio::test]
    async fn create_posts_camel_case_body() {
        let routes = Router::new().route(
            "/api/v1/bookings",
            post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                assert_eq!(body["flightId"], 7);
                assert_eq!(body["defaultCabinClass"], "ECONOMY");
                assert_eq!(body["passengers"][0]["firstName"], "Aziza");
                assert_eq!(body["passengers"][0]["seatNumber"], "12A");
                assert!(body["passengers"][0].get("seatPreference").is_none());
                assert!(body.get("specialRequests").is_none());
                axum::Json(serde_json::json!({
                    "id": 55,
                    "bookingReference": "BK7Q2M",
                    "status": "PENDING",
                    "paymentStatus": "PENDING",
                    "totalAmount": 250.0,
                    "amountDue": 250.0,
                    "totalPassengers": 1,
                }))
            }),
        );
        let (_dir, api) = api_with(routes).await;

        let booking = api.create_booking(&create_request()).await.unwrap();
        assert_eq!(booking.booking_reference, "BK7Q2M");
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.amount_due, 250.0);
    }

    #[tokio::test]
    async fn create_requires_passengers() {
        let (_dir, api) = api_with(Router::new()).await;
        let mut request = create_request();
        request.passengers.clear();
        assert!(matches!(
            api.create_booking(&request).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn booking_detail_and_my_bookings() {
        let routes = Router::new()
            .route(
                "/api/v1/bookings/my",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q["page"], "1");
                    assert_eq!(q["size"], "10");
                    axum::Json(serde_json::json!({
                        "content": [detail_json("BK1")],
                        "totalElements": 11,
                        "totalPages": 2,
                        "number": 1,
                        "last": true,
                    }))
                }),
            )
            .route(
                "/api/v1/bookings/{reference}",
                get(|Path(reference): Path<String>| async move {
                    axum::Json(detail_json(&reference))
                }),
            );
        let (_dir, api) = api_with(routes).await;

        let detail = api.booking("BK7Q2M").await.unwrap();
        assert_eq!(detail.payment_status, PaymentStatus::Completed);
        assert_eq!(detail.tickets[0].seat_number.as_deref(), Some("12A"));
        assert_eq!(detail.contact_info.phone, "+998901234567");

        let page = api.my_bookings(1, 10).await.unwrap();
        assert!(page.last);
        assert_eq!(page.content[0].booking_reference, "BK1");
    }

    #[tokio::test]
    async fn cancel_sends_reason_and_surfaces_conflicts() {
        let routes = Router::new().route(
            "/api/v1/bookings/{reference}/cancel",
            post(
                |Path(reference): Path<String>, axum::Json(body): axum::Json<serde_json::Value>| async move {
                    assert_eq!(body["reason"], "plans changed");
                    if reference == "BKDONE" {
                        (StatusCode::CONFLICT, r#"{"message":"Booking already completed"}"#)
                    } else {
                        (StatusCode::OK, "{}")
                    }
                },
            ),
        );
        let (_dir, api) = api_with(routes).await;

        api.cancel_booking("BK7Q2M", Some("plans changed".into()))
            .await
            .unwrap();
        let err = api
            .cancel_booking("BKDONE", Some("plans changed".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("already completed"));
    }

    #[test]
    fn malformed_references_rejected() {
        assert!(check_reference("BK7Q2M").is_ok());
        assert!(check_reference("tx_1").is_ok());
        assert!(check_reference("").is_err());
        assert!(check_reference("../admin").is_err());
        assert!(check_reference("BK 1").is_err());
    }
}
