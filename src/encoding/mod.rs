//! Child output encoding.
//!
//! [`resolve_encoding`] picks the encoding name from platform and
//! environment signals; [`StreamDecoder`] turns raw pipe bytes into text
//! with replacement characters for malformed input.

mod decoder;
mod resolver;

pub use decoder::StreamDecoder;
pub use resolver::{
    code_page_from_chcp, codeset_from_locale, resolve_encoding, EncodingResolver, Platform,
    DEFAULT_ENCODING, ENCODING_OVERRIDE_VAR,
};
