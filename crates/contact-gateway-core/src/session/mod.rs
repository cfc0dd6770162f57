//! Provider session: state, lifecycle controller, QR challenges and the
//! persisted credential store.

mod challenge;
mod controller;
mod credentials;
mod store;

pub use challenge::{render_challenge, Challenge};
pub use controller::SessionController;
pub use credentials::CredentialStore;
pub use store::{Session, SessionStatus, SharedSession};
