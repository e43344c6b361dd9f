use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use drover_model::{Credential, CredentialName};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where account credentials come from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// TOML file with `[[accounts]]` tables, re-read on every reload.
    pub path: Option<PathBuf>,
    /// Accounts declared directly in the main config.
    pub inline: Vec<Credential>,
}

/// Shape of the accounts file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountsFile {
    #[serde(default)]
    pub accounts: Vec<Credential>,
}

impl AccountsFile {
    pub fn parse(contents: &str, origin: &str) -> anyhow::Result<Self> {
        toml::from_str(contents)
            .map_err(|err| anyhow!("invalid accounts file {origin}: {err}"))
    }
}

impl AccountsConfig {
    pub(crate) fn resolve_relative_to(&mut self, base: &Path) {
        if let Some(path) = &self.path
            && path.is_relative()
        {
            self.path = Some(base.join(path));
        }
    }

    /// Every configured account, file entries first. A name declared twice
    /// keeps its last definition.
    pub fn load(&self) -> anyhow::Result<Vec<Credential>> {
        let mut from_file = Vec::new();
        if let Some(path) = &self.path {
            let contents = fs::read_to_string(path).with_context(|| {
                format!("failed to read accounts from {}", path.display())
            })?;
            from_file =
                AccountsFile::parse(&contents, &path.display().to_string())?
                    .accounts;
        }

        let mut merged: BTreeMap<CredentialName, Credential> =
            BTreeMap::new();
        let declared = from_file.into_iter().chain(self.inline.iter().cloned());
        for credential in declared {
            if let Some(previous) =
                merged.insert(credential.name().clone(), credential)
            {
                warn!(
                    account = %previous.name(),
                    "Account declared more than once; keeping the last definition"
                );
            }
        }
        Ok(merged.into_values().collect())
    }
}
