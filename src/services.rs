pub mod events;
pub mod identity;
pub mod promo;
pub mod promo_store;
pub mod redemption;
pub mod states;
pub mod wallet;
