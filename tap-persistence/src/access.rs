use tap_types::{Identity, ProfileId};

use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

/// Authorization rules for profile documents: anyone reads, only the owner
/// creates or updates, nobody deletes.
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn allows(operation: Operation, actor: Option<&Identity>, owner: ProfileId) -> bool {
        match operation {
            Operation::Read => true,
            Operation::Create | Operation::Update => {
                actor.is_some_and(|identity| identity.profile_id == owner)
            }
            Operation::Delete => false,
        }
    }

    pub fn check(operation: Operation, actor: &Identity, owner: ProfileId) -> Result<(), StoreError> {
        if Self::allows(operation, Some(actor), owner) {
            Ok(())
        } else {
            tracing::warn!(
                "Denied {:?} on profile {} for {}",
                operation,
                owner,
                actor.profile_id
            );
            Err(StoreError::PermissionDenied {
                operation,
                actor: actor.profile_id,
                owner,
            })
        }
    }
}
