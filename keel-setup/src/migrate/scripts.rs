//! Bundled forward-only schema scripts.

use std::collections::{BTreeMap, HashSet};

use sha2::{Digest, Sha256};

use super::MigrationError;

/// Scripts shipped with this binary, named `YYYY-MM-DD_NN_Description`.
const BUNDLED: &[(&str, &str)] = &[
    (
        "2024-01-15_00_InitialSchema",
        include_str!("../../db-scripts/2024-01-15_00_InitialSchema.sql"),
    ),
    (
        "2024-03-02_00_Devices",
        include_str!("../../db-scripts/2024-03-02_00_Devices.sql"),
    ),
    (
        "2024-06-20_00_CipherAttachments",
        include_str!("../../db-scripts/2024-06-20_00_CipherAttachments.sql"),
    ),
];

/// One named schema script and its SHA-256 checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    name: String,
    source: String,
    checksum: String,
}

impl MigrationScript {
    /// Script `name` with SQL `source`.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let checksum = format!("{:x}", Sha256::digest(source.as_bytes()));
        Self {
            name: name.into(),
            source,
            checksum,
        }
    }

    /// Unique name; also the journal key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL text, possibly several statements.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Hex SHA-256 of the source. Informational only; the journal matches
    /// on name.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

/// Scripts ordered by name, names unique.
#[derive(Debug, Clone, Default)]
pub struct ScriptBundle {
    scripts: Vec<MigrationScript>,
}

impl ScriptBundle {
    /// Sort by name; duplicate names are an error.
    pub fn new(
        scripts: impl IntoIterator<Item = MigrationScript>,
    ) -> Result<Self, MigrationError> {
        let mut by_name = BTreeMap::new();
        for script in scripts {
            let name = script.name().to_string();
            if by_name.insert(name.clone(), script).is_some() {
                return Err(MigrationError::DuplicateScript(name));
            }
        }
        Ok(Self {
            scripts: by_name.into_values().collect(),
        })
    }

    /// The scripts compiled into this binary.
    pub fn bundled() -> Result<Self, MigrationError> {
        Self::new(
            BUNDLED
                .iter()
                .map(|(name, source)| MigrationScript::new(*name, *source)),
        )
    }

    /// Scripts in application order.
    pub fn scripts(&self) -> &[MigrationScript] {
        &self.scripts
    }

    /// Number of scripts.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// The bundle holds no scripts.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Scripts whose names are not in `applied`, in bundle order.
    pub fn pending<'a>(
        &'a self,
        applied: &HashSet<String>,
    ) -> Vec<&'a MigrationScript> {
        self.scripts
            .iter()
            .filter(|script| !applied.contains(script.name()))
            .collect()
    }
}
