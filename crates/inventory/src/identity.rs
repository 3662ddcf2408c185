//! Cross-source item identity.
//!
//! Sources name the same physical item independently. [`IdentityPolicy`]
//! decides which unified key a source-local name is merged under.

use std::collections::HashMap;
use std::hash::Hash;

use cleanslate_core::{DomainError, DomainResult, ItemKey, SourceName};

/// Explicit name → canonical id table.
///
/// Entries may be global (any source) or scoped to one source; a scoped entry
/// wins over a global one for that source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    global: HashMap<String, ItemKey>,
    scoped: HashMap<(SourceName, String), ItemKey>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `name` to `canonical`, optionally only for `source`.
    ///
    /// Re-inserting an identical mapping is a no-op; mapping the same name to a
    /// different canonical id is a conflict.
    pub fn insert(
        &mut self,
        source: Option<SourceName>,
        name: &str,
        canonical: ItemKey,
    ) -> DomainResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_id("identity map name cannot be blank"));
        }

        match source {
            Some(source) => {
                let label = format!("'{name}' in source '{source}'");
                insert_checked(&mut self.scoped, (source, name.to_string()), canonical, label)
            }
            None => insert_checked(&mut self.global, name.to_string(), canonical, format!("'{name}'")),
        }
    }

    pub fn canonical_for(&self, source: &SourceName, name: &str) -> Option<&ItemKey> {
        self.scoped
            .get(&(source.clone(), name.to_string()))
            .or_else(|| self.global.get(name))
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_checked<K: Eq + Hash>(
    map: &mut HashMap<K, ItemKey>,
    key: K,
    canonical: ItemKey,
    label: String,
) -> DomainResult<()> {
    match map.get(&key) {
        Some(current) if current != &canonical => Err(DomainError::conflict(format!(
            "{label} already maps to '{current}'"
        ))),
        Some(_) => Ok(()),
        None => {
            map.insert(key, canonical);
            Ok(())
        }
    }
}

/// How source-local names become unified keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// Merge items whose names are equal (legacy behaviour).
    #[default]
    ByName,
    /// Merge only through the identity map; unmapped names stay source-scoped.
    Mapped(IdentityMap),
}

/// Outcome of resolving one source-local name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Key(ItemKey),
    /// No mapping exists; the key is qualified with the source so it is never
    /// merged with another source's item by accident.
    Unmapped(ItemKey),
}

impl Resolution {
    pub fn key(&self) -> &ItemKey {
        match self {
            Self::Key(k) | Self::Unmapped(k) => k,
        }
    }

    pub fn into_key(self) -> ItemKey {
        match self {
            Self::Key(k) | Self::Unmapped(k) => k,
        }
    }
}

impl IdentityPolicy {
    pub fn resolve(&self, source: &SourceName, item: &ItemKey) -> Resolution {
        match self {
            Self::ByName => Resolution::Key(item.clone()),
            Self::Mapped(map) => match map.canonical_for(source, item.as_str()) {
                Some(canonical) => Resolution::Key(canonical.clone()),
                None => Resolution::Unmapped(source_scoped(source, item)),
            },
        }
    }
}

fn source_scoped(source: &SourceName, item: &ItemKey) -> ItemKey {
    // Both parts are non-blank, so the joined key is too.
    match ItemKey::parse(format!("{source}/{item}")) {
        Ok(key) => key,
        Err(_) => item.clone(),
    }
}
