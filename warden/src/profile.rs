//! Identity profiles and the per-session profile set

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Identifier given to profiles built by the anonymous client
pub const ANONYMOUS_ID: &str = "anonymous";

/// A resolved identity: a stable id plus attributes, roles and permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable identifier
    pub id: String,

    /// Name of the client that produced this profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Named attributes, scalar or list values
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// Roles granted to this identity
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Permissions granted to this identity
    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Whether the identity asked to be remembered
    #[serde(default)]
    pub remember_me: bool,

    /// After this instant the profile is stale and ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Create a new profile with the given id
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            client_name: None,
            attributes: HashMap::new(),
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            remember_me: false,
            expires_at: None,
        }
    }

    /// The anonymous identity
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_ID)
    }

    /// Whether this is the anonymous identity
    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_ID
    }

    /// Add a role
    pub fn with_role<S: Into<String>>(mut self, role: S) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add multiple roles
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(|r| r.into()));
        self
    }

    /// Add a permission
    pub fn with_permission<S: Into<String>>(mut self, permission: S) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the producing client name
    pub fn with_client_name<S: Into<String>>(mut self, client_name: S) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    /// Set the expiration instant
    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Attribute lookup
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Check if the identity has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Check if the identity has any of the specified roles
    pub fn has_any_role<I>(&self, roles: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        roles.into_iter().any(|role| self.has_role(role.as_ref()))
    }

    /// Check if the identity has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Check if the profile is past its expiration
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }
}

/// All profiles known for the current session or request, keyed by client name
///
/// Insertion ordered. Saving a profile under a client name that is already
/// present replaces that entry in place. Serialized as a list of
/// `[client name, profile]` pairs so the order survives any JSON backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, Profile)>", into = "Vec<(String, Profile)>")]
pub struct ProfileSet {
    profiles: IndexMap<String, Profile>,
}

impl ProfileSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding a single profile
    pub fn single<S: Into<String>>(client_name: S, profile: Profile) -> Self {
        let mut set = Self::new();
        set.insert(client_name, profile);
        set
    }

    /// Insert or replace the profile for `client_name`
    pub fn insert<S: Into<String>>(&mut self, client_name: S, profile: Profile) -> Option<Profile> {
        self.profiles.insert(client_name.into(), profile)
    }

    /// Merge `other` into this set; entries of `other` win
    pub fn merge(&mut self, other: ProfileSet) {
        for (client_name, profile) in other.profiles {
            self.profiles.insert(client_name, profile);
        }
    }

    /// Remove the profile for `client_name`, keeping the order of the others
    pub fn remove(&mut self, client_name: &str) -> Option<Profile> {
        self.profiles.shift_remove(client_name)
    }

    /// Profile for `client_name`
    pub fn get(&self, client_name: &str) -> Option<&Profile> {
        self.profiles.get(client_name)
    }

    /// Whether a profile is recorded for `client_name`
    pub fn contains_client(&self, client_name: &str) -> bool {
        self.profiles.contains_key(client_name)
    }

    /// First profile in insertion order
    pub fn first(&self) -> Option<&Profile> {
        self.profiles.values().next()
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Iterate `(client name, profile)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Profile)> {
        self.profiles.iter().map(|(name, profile)| (name.as_str(), profile))
    }

    /// Iterate profiles in insertion order
    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    /// Client names in insertion order
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Drop expired profiles, returning how many were removed
    pub fn remove_expired(&mut self) -> usize {
        let before = self.profiles.len();
        self.profiles.retain(|_, profile| !profile.is_expired());
        before - self.profiles.len()
    }
}

impl FromIterator<(String, Profile)> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = (String, Profile)>>(iter: I) -> Self {
        Self {
            profiles: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<(String, Profile)>> for ProfileSet {
    fn from(entries: Vec<(String, Profile)>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<ProfileSet> for Vec<(String, Profile)> {
    fn from(set: ProfileSet) -> Self {
        set.profiles.into_iter().collect()
    }
}
