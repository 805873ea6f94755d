//! Email decoding: header codec, content-transfer decoding, `Content-Type`
//! parsing, and MIME structure.

pub mod content;
pub mod content_type;
pub mod header;
pub mod mime;

pub use content_type::ContentType;
pub use mime::parse_mime;
