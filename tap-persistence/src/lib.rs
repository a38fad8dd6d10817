pub mod access;
pub mod connection;
pub mod entities;
pub mod error;
pub mod local;
pub mod repositories;
pub mod store;

pub use access::{AccessPolicy, Operation};
pub use error::StoreError;
pub use local::LocalProfileStore;
pub use store::{Credential, CredentialStore, ProfileStore};
