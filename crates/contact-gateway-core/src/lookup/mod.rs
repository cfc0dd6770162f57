//! Phone-number lookups: request normalization, result projection and the
//! readiness-gated [`RequestGateway`].

mod gateway;
mod types;

pub use gateway::{RequestGateway, StatusView};
pub use types::{
    normalize_number, LookupError, LookupRequest, LookupResult, SearchOutcome, RECOVERED_NOTE,
};
