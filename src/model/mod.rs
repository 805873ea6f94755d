//! Core data model: headers, addresses, parsed emails, and stored records.

pub mod address;
pub mod document;
pub mod email;
pub mod header;
pub mod stored;

pub use email::Email;
pub use header::Header;
pub use stored::StoredEmail;
