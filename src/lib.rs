//! contact-gateway: HTTP front end for provider contact lookups.

pub mod web;
