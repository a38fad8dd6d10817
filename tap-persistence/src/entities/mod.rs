pub mod prelude;

pub mod accounts;
pub mod profiles;
pub mod round_scores;
