pub mod hash;
pub mod response;

pub use hash::card_key;
pub use response::parse_response;
