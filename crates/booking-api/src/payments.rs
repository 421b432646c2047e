//! Payment endpoints (authenticated)

use session_core::ApiRequest;
use tracing::info;

use crate::BookingApi;
use crate::bookings::check_reference;
use crate::card::validate_card_number;
use crate::error::{Error, Result};
use crate::model::{CreatePaymentRequest, PaymentMethod, PaymentResponse, PaymentStatusResponse};

impl BookingApi {
    /// `POST /payments`. Card payments are checked locally (brand, length,
    /// checksum) before anything is sent.
    pub async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<PaymentResponse> {
        check_reference(&request.booking_reference)?;
        if request.amount <= 0.0 {
            return Err(Error::InvalidRequest("payment amount must be positive".into()));
        }
        if request.payment_method == PaymentMethod::Card {
            let number = request
                .card_number
                .as_deref()
                .ok_or_else(|| Error::InvalidCard("card number is required".into()))?;
            let brand = validate_card_number(number)?;
            info!(
                reference = %request.booking_reference,
                brand = brand.name(),
                "submitting card payment"
            );
        }

        let api_request = ApiRequest::post("/payments")
            .json(request)
            .map_err(Error::Api)?;
        let payment: PaymentResponse = self.client().json(&api_request).await?;
        info!(
            reference = %payment.booking_reference,
            transaction_id = %payment.transaction_id,
            status = ?payment.status,
            "payment submitted"
        );
        Ok(payment)
    }

    /// `GET /payments/status/{transactionId}`
    pub async fn payment_status(&self, transaction_id: &str) -> Result<PaymentStatusResponse> {
        check_reference(transaction_id)?;
        Ok(self
            .client()
            .json(&ApiRequest::get(format!("/payments/status/{transaction_id}")))
            .await?)
    }

    /// `GET /payments/booking/{reference}`
    pub async fn payment_for_booking(&self, reference: &str) -> Result<PaymentResponse> {
        check_reference(reference)?;
        Ok(self
            .client()
            .json(&ApiRequest::get(format!("/payments/booking/{reference}")))
            .await?)
    }
}
