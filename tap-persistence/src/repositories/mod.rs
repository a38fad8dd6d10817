pub mod account_repository;
pub mod profile_repository;

pub use account_repository::AccountRepository;
pub use profile_repository::ProfileRepository;
