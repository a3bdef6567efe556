//! Background tasks driving one hub connection.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
