// Data model shared between route handlers and the database client

pub mod payloads;
pub mod records;
