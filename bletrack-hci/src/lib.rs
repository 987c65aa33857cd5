pub mod classify;
pub mod decoder;
pub mod event;
pub mod framing;
