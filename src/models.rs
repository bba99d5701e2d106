pub mod api;
pub mod client;
pub mod promo_code;
