use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::domain::{ResourceDomain, WorkerKind};
use crate::error::{ModelError, Result};
use crate::region::Region;

/// Stable, unique identity of an account credential.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct CredentialName(String);

impl CredentialName {
    pub fn try_new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyCredentialName);
        }
        if trimmed.len() == raw.len() {
            Ok(Self(raw))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CredentialName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CredentialName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CredentialName {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_new(value)
    }
}

impl FromStr for CredentialName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_new(s)
    }
}

impl From<CredentialName> for String {
    fn from(value: CredentialName) -> Self {
        value.0
    }
}

/// Deduplication key for a worker, shared by registries and schedulers.
///
/// Region-global ids deliberately omit the owning account so a change of
/// ownership keeps the same id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerId(String);

impl WorkerId {
    pub fn compose(
        domain: ResourceDomain,
        kind: WorkerKind,
        account: Option<&CredentialName>,
        region: Option<&Region>,
    ) -> Self {
        let mut id = String::from(domain.tag());
        if let Some(account) = account {
            id.push('/');
            id.push_str(account.as_str());
        }
        if let Some(region) = region {
            id.push('/');
            id.push_str(region.as_str());
        }
        id.push('/');
        id.push_str(kind.name());
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_names_are_trimmed_and_non_empty() {
        let name = CredentialName::try_new("  prod  ").expect("valid name");
        assert_eq!(name.as_str(), "prod");
        assert_eq!(
            CredentialName::try_new("   "),
            Err(ModelError::EmptyCredentialName)
        );
    }

    #[test]
    fn region_global_ids_do_not_mention_the_account() {
        let region = Region::try_new("us-east-1").expect("region");
        let account = CredentialName::try_new("acct-a").expect("name");

        let scoped = WorkerId::compose(
            ResourceDomain::Compute,
            WorkerKind::InstanceCaching,
            Some(&account),
            Some(&region),
        );
        let global = WorkerId::compose(
            ResourceDomain::Compute,
            WorkerKind::PublicImageCaching,
            None,
            Some(&region),
        );

        assert_eq!(scoped.as_str(), "compute/acct-a/us-east-1/InstanceCaching");
        assert_eq!(global.as_str(), "compute/us-east-1/PublicImageCaching");
    }
}
