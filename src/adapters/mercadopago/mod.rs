//! MercadoPago adapter - wallet gateway payment-query client.

mod client;

pub use client::{MercadoPagoClient, MercadoPagoConfig};
