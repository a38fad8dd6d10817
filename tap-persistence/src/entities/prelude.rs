pub use super::accounts::Entity as Accounts;
pub use super::profiles::Entity as Profiles;
pub use super::round_scores::Entity as RoundScores;
