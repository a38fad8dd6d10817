use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{Identity, NewProfile, Profile};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    #[serde(default)]
    pub marketing_consent: bool,
}

impl SignUpRequest {
    pub fn draft(&self) -> NewProfile {
        NewProfile {
            first_name: self.first_name.trim().to_string(),
            email: self.email.clone(),
            marketing_consent: self.marketing_consent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Returned by sign-up and sign-in. The token authenticates both HTTP
/// requests and the WebSocket `Authenticate` message.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionResponse {
    pub token: String,
    pub identity: Identity,
    pub profile: Option<Profile>,
}
