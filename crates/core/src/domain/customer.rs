use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted customer. Absent fields are stored as empty strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
}

impl Customer {
    pub fn from_lookup(lookup: &CustomerLookup) -> Self {
        Self {
            id: CustomerId::generate(),
            name: lookup.name.clone(),
            email: lookup.email.clone(),
            address: lookup.address.clone(),
        }
    }

    pub fn matches_email(&self, normalized_email: &str) -> bool {
        !normalized_email.is_empty() && normalize_email(&self.email) == normalized_email
    }
}

/// Identity fields supplied by a caller, normalized once so every lookup and
/// every write sees the same values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerLookup {
    pub name: String,
    pub email: String,
    pub address: String,
}

impl CustomerLookup {
    pub fn new(name: Option<&str>, email: Option<&str>, address: Option<&str>) -> Self {
        Self {
            name: name.map(str::trim).unwrap_or_default().to_string(),
            email: email.map(normalize_email).unwrap_or_default(),
            address: address.map(str::trim).unwrap_or_default().to_string(),
        }
    }

    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }

    pub fn has_name_and_address(&self) -> bool {
        !self.name.is_empty() && !self.address.is_empty()
    }

    /// A record may only be created when it carries a name or an email.
    pub fn can_create(&self) -> bool {
        !self.name.is_empty() || !self.email.is_empty()
    }

    /// Key under which concurrent resolutions of the same identity serialize.
    pub fn lock_key(&self) -> String {
        if self.has_email() {
            format!("customer:email:{}", self.email)
        } else {
            format!("customer:name-address:{}|{}", self.name, self.address)
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
