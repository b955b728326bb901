//! Permission semantics for shared secrets.
//!
//! A recipient holds an independent triple of flags. There is no
//! hierarchy and no implication between flags: `edit` without `view`
//! means the recipient can overwrite a secret it cannot read.

use lockbox_storage::models::{PermissionSet, StoredGrant};
use uuid::Uuid;

/// The capability an operation requires on a shared secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    View,
    Edit,
    Delete,
}

impl Capability {
    /// The lowercase wire name of this capability.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

/// Whether a permission triple allows exactly the given capability.
#[must_use]
pub const fn allows(permissions: PermissionSet, capability: Capability) -> bool {
    match capability {
        Capability::View => permissions.view,
        Capability::Edit => permissions.edit,
        Capability::Delete => permissions.delete,
    }
}

/// How a caller relates to a secret, used to pick between "not found"
/// and "forbidden".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The caller owns the secret — every capability allowed.
    Owner,
    /// The caller is a grant recipient and holds the capability.
    Granted,
    /// The caller is a grant recipient but lacks the capability.
    Denied,
    /// The caller has no relationship with the secret.
    Unrelated,
}

/// Resolve a caller's access to a secret for one capability.
#[must_use]
pub fn resolve(
    owner_id: Uuid,
    grant: Option<&StoredGrant>,
    caller: Uuid,
    capability: Capability,
) -> Access {
    if caller == owner_id {
        return Access::Owner;
    }
    match grant.and_then(|g| g.permissions_for(caller)) {
        Some(permissions) if allows(permissions, capability) => Access::Granted,
        Some(_) => Access::Denied,
        None => Access::Unrelated,
    }
}
