//! Adapters - implementations of ports against real infrastructure.

pub mod http;
pub mod mercadopago;
pub mod postgres;
pub mod telegram;
