//! Wire tags for message kinds, resolved once at load time.

use std::collections::BTreeMap;

use dcopforge_core::MessageKind;

use crate::ConfigError;

/// Bidirectional mapping between message kinds and wire tags.
///
/// Built from the default tags plus overrides keyed by `module.NAME`.
/// Overrides naming unknown kinds, remapping orchestration kinds, or
/// producing colliding tags are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTable {
    tags: BTreeMap<MessageKind, u16>,
    kinds: BTreeMap<u16, MessageKind>,
}

impl Default for MessageTable {
    fn default() -> Self {
        let tags: BTreeMap<_, _> = MessageKind::ALL
            .iter()
            .map(|&kind| (kind, kind.default_tag()))
            .collect();
        let kinds = tags.iter().map(|(&kind, &tag)| (tag, kind)).collect();
        MessageTable { tags, kinds }
    }
}

impl MessageTable {
    /// Applies `overrides` on top of the default tags.
    pub fn resolve(overrides: &BTreeMap<String, u16>) -> Result<Self, ConfigError> {
        let mut tags = MessageTable::default().tags;
        for (name, &tag) in overrides {
            let kind = MessageKind::from_logical_name(name).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown message kind '{name}'"))
            })?;
            if kind.is_orchestration() {
                return Err(ConfigError::Invalid(format!(
                    "orchestration message '{name}' cannot be remapped"
                )));
            }
            tags.insert(kind, tag);
        }

        let mut kinds = BTreeMap::new();
        for (&kind, &tag) in &tags {
            if let Some(previous) = kinds.insert(tag, kind) {
                return Err(ConfigError::Invalid(format!(
                    "wire tag {tag} is used by both {previous} and {kind}"
                )));
            }
        }
        Ok(MessageTable { tags, kinds })
    }

    /// Fails if any of `kinds` has no tag.
    pub fn require(&self, kinds: &[MessageKind]) -> Result<(), ConfigError> {
        match kinds.iter().find(|k| !self.tags.contains_key(k)) {
            Some(missing) => Err(ConfigError::Invalid(format!(
                "no wire tag for message kind {missing}"
            ))),
            None => Ok(()),
        }
    }

    pub fn tag(&self, kind: MessageKind) -> Option<u16> {
        self.tags.get(&kind).copied()
    }

    pub fn kind(&self, tag: u16) -> Option<MessageKind> {
        self.kinds.get(&tag).copied()
    }
}
