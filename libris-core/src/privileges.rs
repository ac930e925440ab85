//! Privilege resolution
//!
//! Capabilities are a closed set. A role maps to a fixed capability set and an
//! actor's custom grants are unioned on top. Resolution is pure and in-memory.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

/// Atomic permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Create records that are approved and visible immediately
    ElevatedCreate,
    DraftCreate,
    DraftEdit,
    DraftDelete,
    DraftMerge,
    Edit,
    Delete,
    Merge,
    Moderate,
    Admin,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::ElevatedCreate,
        Capability::DraftCreate,
        Capability::DraftEdit,
        Capability::DraftDelete,
        Capability::DraftMerge,
        Capability::Edit,
        Capability::Delete,
        Capability::Merge,
        Capability::Moderate,
        Capability::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ElevatedCreate => "elevated-create",
            Capability::DraftCreate => "draft-create",
            Capability::DraftEdit => "draft-edit",
            Capability::DraftDelete => "draft-delete",
            Capability::DraftMerge => "draft-merge",
            Capability::Edit => "edit",
            Capability::Delete => "delete",
            Capability::Merge => "merge",
            Capability::Moderate => "moderate",
            Capability::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

/// Actor role, ordered by trust
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Default = 0,
    Contributor = 1,
    Moderator = 2,
    Admin = 3,
}

impl Role {
    pub fn ordinal(self) -> i64 {
        self as i64
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        Some(match ordinal {
            0 => Role::Default,
            1 => Role::Contributor,
            2 => Role::Moderator,
            3 => Role::Admin,
            _ => return None,
        })
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Role::Default),
            "contributor" => Ok(Role::Contributor),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Set of capabilities held by an actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Capability> for CapabilitySet {
    fn extend<I: IntoIterator<Item = Capability>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

/// Capabilities granted by a role alone
pub fn capabilities_for(role: Role) -> CapabilitySet {
    use Capability::*;

    let mut set: CapabilitySet = [DraftCreate, DraftEdit, DraftDelete, DraftMerge]
        .into_iter()
        .collect();
    if role >= Role::Contributor {
        set.extend([ElevatedCreate, Edit]);
    }
    if role >= Role::Moderator {
        set.extend([Delete, Merge, Moderate]);
    }
    if role >= Role::Admin {
        set.extend(Capability::ALL);
    }
    set
}

/// Rate-limited action tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTier {
    Create,
    Edit,
    Search,
}

/// The authenticated caller of a core operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    /// Custom grants unioned onto the role's set
    pub grants: CapabilitySet,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self {
            id,
            role,
            grants: CapabilitySet::default(),
        }
    }

    pub fn with_grant(mut self, capability: Capability) -> Self {
        self.grants.insert(capability);
        self
    }

    /// Role capabilities plus custom grants
    pub fn capabilities(&self) -> CapabilitySet {
        let mut set = capabilities_for(self.role);
        set.extend(self.grants.iter());
        set
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.grants.contains(capability) || capabilities_for(self.role).contains(capability)
    }

    /// Fail with `Forbidden` unless the actor holds `capability`
    pub fn require(&self, capability: Capability) -> CoreResult<()> {
        if self.has(capability) {
            Ok(())
        } else {
            tracing::debug!(actor_id = %self.id, capability = %capability, "Capability check failed");
            Err(CoreError::Forbidden(capability))
        }
    }

    /// Require `full`, or `draft` when `owns_draft` holds
    ///
    /// Used for the edit/delete/merge pairs where submitters may act on their
    /// own records until a moderator approves them.
    pub fn require_either(&self, full: Capability, draft: Capability, owns_draft: bool) -> CoreResult<()> {
        if self.has(full) || (owns_draft && self.has(draft)) {
            Ok(())
        } else {
            tracing::debug!(actor_id = %self.id, capability = %full, "Capability check failed");
            Err(CoreError::Forbidden(full))
        }
    }
}

/// Requests per minute allowed for `tier`; `None` means unlimited
pub fn rate_allowance(actor: &Actor, tier: RateTier) -> Option<u32> {
    if actor.has(Capability::Admin) {
        return None;
    }
    let (create, edit, search) = match actor.role {
        Role::Default => (5, 20, 60),
        Role::Contributor => (30, 120, 300),
        Role::Moderator => (100, 500, 1000),
        Role::Admin => return None,
    };
    Some(match tier {
        RateTier::Create => create,
        RateTier::Edit => edit,
        RateTier::Search => search,
    })
}
