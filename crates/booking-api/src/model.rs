//! Wire types for the booking backend
//!
//! Field names follow the backend's camelCase JSON; enums are its
//! SCREAMING_SNAKE_CASE strings. Optional and informational fields default so
//! a backend adding or dropping them does not break decoding.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Economy,
    Business,
    FirstClass,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "ECONOMY",
            CabinClass::Business => "BUSINESS",
            CabinClass::FirstClass => "FIRST_CLASS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightSortBy {
    Price,
    Duration,
    DepartureTime,
}

impl FlightSortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightSortBy::Price => "PRICE",
            FlightSortBy::Duration => "DURATION",
            FlightSortBy::DepartureTime => "DEPARTURE_TIME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    Scheduled,
    Boarding,
    Departed,
    InFlight,
    Arrived,
    Delayed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    Cash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatPreference {
    Window,
    Aisle,
    Middle,
}

// --- flights ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Airport {
    pub id: i64,
    pub iata_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub timezone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Airline {
    pub id: i64,
    pub iata_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Checked baggage in kg
    #[serde(default)]
    pub baggage_allowance: u32,
    #[serde(default)]
    pub hand_luggage: u32,
    #[serde(default)]
    pub is_low_cost: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    pub id: i64,
    pub flight_number: String,
    pub airline: Airline,
    pub origin: Airport,
    pub destination: Airport,
    /// ISO-8601 local time at origin
    pub departure_time: String,
    pub arrival_time: String,
    #[serde(default)]
    pub duration: String,
    pub status: FlightStatus,
    #[serde(default)]
    pub available_seats: u32,
    pub economy_price: f64,
    #[serde(default)]
    pub business_price: Option<f64>,
    #[serde(default)]
    pub first_class_price: Option<f64>,
    #[serde(default)]
    pub aircraft_type: Option<String>,
}

impl Flight {
    /// Listed fare for a cabin, if the flight sells it.
    pub fn price_for(&self, cabin: CabinClass) -> Option<f64> {
        match cabin {
            CabinClass::Economy => Some(self.economy_price),
            CabinClass::Business => self.business_price,
            CabinClass::FirstClass => self.first_class_price,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlightSearch {
    pub origin_code: String,
    pub destination_code: String,
    /// `YYYY-MM-DD`
    pub departure_date: String,
    pub passengers: u32,
    pub cabin_class: CabinClass,
    pub sort_by: Option<FlightSortBy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularDestination {
    pub airport: Airport,
    #[serde(default)]
    pub flight_count: u32,
    #[serde(default)]
    pub min_price: f64,
    #[serde(default)]
    pub avg_price: f64,
}

/// Spring-style page envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub size: u32,
    /// Zero-based page index
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub last: bool,
    #[serde(default)]
    pub empty: bool,
}

// --- bookings ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerInfo {
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    pub gender: Gender,
    pub nationality: String,
    pub passport_number: String,
    pub passport_country: String,
    pub passport_expiry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cabin_class: Option<CabinClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_preference: Option<SeatPreference>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub flight_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_cabin_class: Option<CabinClass>,
    pub passengers: Vec<PassengerInfo>,
    pub contact_email: String,
    pub contact_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    #[serde(default)]
    pub id: i64,
    pub booking_reference: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub amount_due: f64,
    #[serde(default)]
    pub total_passengers: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default)]
    pub payment_instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub ticket_number: String,
    #[serde(default)]
    pub passenger_name: String,
    pub flight_number: String,
    /// IATA code
    pub origin: String,
    pub destination: String,
    pub departure_time: String,
    #[serde(default)]
    pub arrival_time: String,
    pub cabin_class: CabinClass,
    #[serde(default)]
    pub seat_number: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    #[serde(default)]
    pub id: i64,
    pub booking_reference: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub amount_due: f64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default)]
    pub confirmed_at: Option<String>,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub special_requests: Option<String>,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CancelBookingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// --- payments ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub booking_reference: String,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_holder_name: Option<String>,
    /// `MM/YY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[serde(default)]
    pub id: i64,
    pub transaction_id: String,
    pub booking_reference: String,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub transaction_id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub message: String,
}

// --- pricing ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicPrice {
    pub flight_id: i64,
    pub cabin_class: CabinClass,
    pub base_price: f64,
    pub dynamic_price: f64,
    #[serde(default)]
    pub occupancy_multiplier: f64,
    #[serde(default)]
    pub time_multiplier: f64,
    #[serde(default)]
    pub day_of_week_multiplier: f64,
    #[serde(default)]
    pub total_multiplier: f64,
    #[serde(default)]
    pub price_increase: f64,
    #[serde(default)]
    pub percentage_increase: f64,
    #[serde(default)]
    pub booking_date: String,
}
