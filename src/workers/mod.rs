//! Background consumers decoupled from the request path.

pub mod thumbnail_worker;
