//! Typed identifiers, following the teacher's `auth::resource` newtype
//! idiom (`derive_more` for the plumbing, `diesel-derive-newtype` so each
//! type round-trips through its own column). Candidates are identified by
//! a stable string, not a UUID (§3); resource providers keep their native
//! UUID.

use derive_more::{Deref, Display, From, FromStr};
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};

/// A schedulable target: compute host, volume host, share host, or pool
/// name. Never created by this system; only observed in datasource rows
/// and referenced by requests.
#[derive(
    Clone, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Deref, From, FromStr,
    Serialize, Deserialize, DieselNewType,
)]
pub struct HostName(pub String);

impl HostName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HostName {
    fn from(s: &str) -> Self {
        HostName(s.to_string())
    }
}

#[derive(
    Clone, Copy, Debug, Display, Hash, PartialEq, Eq, Deref, From, FromStr,
    Serialize, Deserialize, DieselNewType,
)]
pub struct ResourceProviderId(pub uuid::Uuid);

#[derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deref, From, FromStr, Serialize, Deserialize)]
pub struct ProjectId(pub String);

#[derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deref, From, FromStr, Serialize, Deserialize)]
pub struct FlavorName(pub String);
