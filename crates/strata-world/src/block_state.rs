//! Immutable block identifiers stored in block storage palettes.
//!
//! A [`BlockState`] is always addressable by its canonical name. Formats that
//! know more about a block may attach a property map (modern string states)
//! or a legacy numeric id/meta pair. Equality is by value, so two palettes
//! holding `minecraft:stone` refer to the same block.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical name of the air block.
pub const AIR_NAME: &str = "minecraft:air";

/// A block type plus the optional views a format may provide for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    name: String,
    properties: Option<BTreeMap<String, String>>,
    legacy: Option<LegacyId>,
}

/// Numeric block id and metadata value used by older world formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegacyId {
    /// Numeric block id.
    pub id: u16,
    /// Metadata (damage) value.
    pub meta: u16,
}

impl BlockState {
    /// Creates a state carrying only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: None,
            legacy: None,
        }
    }

    /// Creates a state with a property map.
    pub fn with_properties(name: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            properties: Some(properties),
            legacy: None,
        }
    }

    /// Creates a state with a legacy numeric id and meta.
    pub fn with_legacy(name: impl Into<String>, id: u16, meta: u16) -> Self {
        Self {
            name: name.into(),
            properties: None,
            legacy: Some(LegacyId { id, meta }),
        }
    }

    /// Returns `minecraft:air`.
    pub fn air() -> Self {
        Self::new(AIR_NAME)
    }

    /// Returns a copy of this state with one property set.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Returns a copy of this state with a legacy id attached.
    pub fn legacy(mut self, id: u16, meta: u16) -> Self {
        self.legacy = Some(LegacyId { id, meta });
        self
    }

    /// Canonical block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the air block.
    pub fn is_air(&self) -> bool {
        self.name == AIR_NAME
    }

    /// Name and property map, or `None` if this state has no property view.
    pub fn to_name_properties(&self) -> Option<(&str, &BTreeMap<String, String>)> {
        self.properties.as_ref().map(|p| (self.name.as_str(), p))
    }

    /// Name and legacy meta, or `None` if no legacy view is attached.
    pub fn to_name_meta(&self) -> Option<(&str, u16)> {
        self.legacy.map(|l| (self.name.as_str(), l.meta))
    }

    /// Legacy numeric id and meta, or `None` if no legacy view is attached.
    pub fn to_id_meta(&self) -> Option<(u16, u16)> {
        self.legacy.map(|l| (l.id, l.meta))
    }

    /// Raw access to the property map.
    pub fn properties(&self) -> Option<&BTreeMap<String, String>> {
        self.properties.as_ref()
    }

    /// Raw access to the legacy id.
    pub fn legacy_id(&self) -> Option<LegacyId> {
        self.legacy
    }
}

impl Default for BlockState {
    fn default() -> Self {
        Self::air()
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(props) = &self.properties
            && !props.is_empty()
        {
            f.write_str("[")?;
            for (i, (k, v)) in props.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{k}={v}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_value() {
        let a = BlockState::new("minecraft:stone").property("variant", "granite");
        let b = BlockState::new("minecraft:stone").property("variant", "granite");
        assert_eq!(a, b);
        assert_ne!(a, BlockState::new("minecraft:stone"));
    }

    #[test]
    fn test_views_report_unsupported() {
        let plain = BlockState::new("minecraft:dirt");
        assert!(plain.to_name_properties().is_none());
        assert!(plain.to_name_meta().is_none());
        assert!(plain.to_id_meta().is_none());
    }

    #[test]
    fn test_legacy_views() {
        let wool = BlockState::with_legacy("minecraft:wool", 35, 14);
        assert_eq!(wool.to_id_meta(), Some((35, 14)));
        assert_eq!(wool.to_name_meta(), Some(("minecraft:wool", 14)));
    }

    #[test]
    fn test_display_includes_properties() {
        let log = BlockState::new("minecraft:log")
            .property("axis", "y")
            .property("age", "1");
        assert_eq!(log.to_string(), "minecraft:log[age=1,axis=y]");
        assert_eq!(BlockState::air().to_string(), AIR_NAME);
    }

    #[test]
    fn test_default_is_air() {
        assert!(BlockState::default().is_air());
    }
}
