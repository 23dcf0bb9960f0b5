use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One access-control entry: a principal and the permissions granted to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal: String,
    pub permissions: BTreeSet<String>,
}

/// Access-control list stored with a page.
///
/// The content layer only stores ACLs; deciding whether a principal is
/// allowed to act is left to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    entries: Vec<AclEntry>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `permission` to `principal`, merging with any existing entry.
    pub fn grant(&mut self, principal: impl Into<String>, permission: impl Into<String>) {
        let principal = principal.into();
        let permission = permission.into();
        match self.entries.iter_mut().find(|e| e.principal == principal) {
            Some(entry) => {
                entry.permissions.insert(permission);
            }
            None => self.entries.push(AclEntry {
                principal,
                permissions: BTreeSet::from([permission]),
            }),
        }
    }

    /// The entry for `principal`, if one exists.
    pub fn entry(&self, principal: &str) -> Option<&AclEntry> {
        self.entries.iter().find(|e| e.principal == principal)
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in &self.entries {
            for perm in &entry.permissions {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{perm}:{}", entry.principal)?;
                first = false;
            }
        }
        Ok(())
    }
}
