//! Secure links: the record, its wire encoding, and the on-disk store.

pub mod codec;
pub mod record;
pub mod store;
