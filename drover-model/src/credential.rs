use crate::ids::CredentialName;
use crate::region::Region;

pub const DEFAULT_CLOUD_PROVIDER: &str = "aws";

/// Per-capability switches carried by a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Capabilities {
    pub container_orchestration: bool,
    pub serverless: bool,
    pub reservation_reports: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            container_orchestration: false,
            serverless: false,
            reservation_reports: true,
        }
    }
}

/// A validated account credential.
///
/// Values are immutable; an update is a new value published under the same
/// name. Regions keep their declared order with duplicates removed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "CredentialDefinition", into = "CredentialDefinition")
)]
pub struct Credential {
    name: CredentialName,
    cloud_provider: String,
    regions: Vec<Region>,
    capabilities: Capabilities,
}

impl Credential {
    pub fn new(
        name: CredentialName,
        regions: impl IntoIterator<Item = Region>,
    ) -> Self {
        let mut unique: Vec<Region> = Vec::new();
        for region in regions {
            if !unique.contains(&region) {
                unique.push(region);
            }
        }
        Self {
            name,
            cloud_provider: DEFAULT_CLOUD_PROVIDER.to_string(),
            regions: unique,
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_cloud_provider(mut self, provider: impl Into<String>) -> Self {
        self.cloud_provider = provider.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn name(&self) -> &CredentialName {
        &self.name
    }

    pub fn cloud_provider(&self) -> &str {
        &self.cloud_provider
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn has_region(&self, region: &Region) -> bool {
        self.regions.contains(region)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Serialized shape of a credential, as found in account definition files.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CredentialDefinition {
    pub name: CredentialName,
    #[cfg_attr(feature = "serde", serde(default = "default_cloud_provider"))]
    pub cloud_provider: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub regions: Vec<Region>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub capabilities: Capabilities,
}

#[cfg(feature = "serde")]
fn default_cloud_provider() -> String {
    DEFAULT_CLOUD_PROVIDER.to_string()
}

impl From<CredentialDefinition> for Credential {
    fn from(definition: CredentialDefinition) -> Self {
        Credential::new(definition.name, definition.regions)
            .with_cloud_provider(definition.cloud_provider)
            .with_capabilities(definition.capabilities)
    }
}

impl From<Credential> for CredentialDefinition {
    fn from(credential: Credential) -> Self {
        Self {
            name: credential.name,
            cloud_provider: credential.cloud_provider,
            regions: credential.regions,
            capabilities: credential.capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(name: &str) -> Region {
        Region::try_new(name).expect("valid region")
    }

    #[test]
    fn duplicate_regions_collapse_in_declared_order() {
        let credential = Credential::new(
            CredentialName::try_new("prod").expect("name"),
            [region("us-west-2"), region("us-east-1"), region("us-west-2")],
        );

        assert_eq!(
            credential.regions(),
            &[region("us-west-2"), region("us-east-1")]
        );
        assert!(credential.has_region(&region("us-east-1")));
        assert_eq!(credential.cloud_provider(), DEFAULT_CLOUD_PROVIDER);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn definitions_deserialize_with_defaults() {
        let raw = r#"
            name = "staging"
            regions = ["eu-west-1", "eu-west-1"]

            [capabilities]
            serverless = true
        "#;

        let credential: Credential = toml::from_str(raw).expect("parse");
        assert_eq!(credential.name().as_str(), "staging");
        assert_eq!(credential.regions().len(), 1);
        assert!(credential.capabilities().serverless);
        assert!(credential.capabilities().reservation_reports);
        assert!(!credential.capabilities().container_orchestration);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn blank_names_are_rejected() {
        let err = serde_json::from_str::<Credential>(r#"{"name": "  "}"#)
            .expect_err("blank name");
        assert!(err.to_string().contains("must not be empty"));
    }
}
