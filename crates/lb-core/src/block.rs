use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::SYSTEM_PROMPT_KIND;
use crate::hash::content_hash;
use crate::tokenizer::estimate_tokens;

/// Priority tier of a block. Declaration order is assembly order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Permanent,
    Stable,
    Working,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Permanent, Zone::Stable, Zone::Working];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Permanent => "permanent",
            Zone::Stable => "stable",
            Zone::Working => "working",
        }
    }

    /// Durable zones stay synchronized across workflow steps.
    pub fn is_durable(&self) -> bool {
        matches!(self, Zone::Permanent | Zone::Stable)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseZoneError(pub String);

impl fmt::Display for ParseZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown zone '{}' (expected permanent, stable or working)",
            self.0
        )
    }
}

impl std::error::Error for ParseZoneError {}

impl FromStr for Zone {
    type Err = ParseZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permanent" => Ok(Zone::Permanent),
            "stable" => Ok(Zone::Stable),
            "working" => Ok(Zone::Working),
            other => Err(ParseZoneError(other.to_string())),
        }
    }
}

/// REGULAR blocks own their content; LINKED blocks delegate to a canonical.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    Regular,
    Linked,
}

/// The unit entity: one piece of text owned by exactly one workspace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub workspace_id: String,
    /// Empty whenever `reference_id` is set.
    pub content: String,
    pub kind: String,
    pub zone: Zone,
    pub order_key: f64,
    pub reference_id: Option<Uuid>,
    pub content_hash: Option<String>,
    /// Cached estimate, recomputable from content at any time.
    pub token_count: usize,
    pub is_draft: bool,
}

impl Block {
    /// A REGULAR block with hash and token count derived from `content`.
    pub fn new_regular(
        workspace_id: &str,
        kind: &str,
        zone: Zone,
        order_key: f64,
        content: &str,
    ) -> Self {
        let mut block = Self {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.to_string(),
            content: String::new(),
            kind: kind.to_string(),
            zone,
            order_key,
            reference_id: None,
            content_hash: None,
            token_count: 0,
            is_draft: false,
        };
        block.set_content(content);
        block
    }

    /// A LINKED block. Content and hash stay empty; they live at the canonical.
    pub fn new_linked(
        workspace_id: &str,
        kind: &str,
        zone: Zone,
        order_key: f64,
        canonical_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.to_string(),
            content: String::new(),
            kind: kind.to_string(),
            zone,
            order_key,
            reference_id: Some(canonical_id),
            content_hash: None,
            token_count: 0,
            is_draft: false,
        }
    }

    pub fn state(&self) -> BlockState {
        if self.reference_id.is_some() {
            BlockState::Linked
        } else {
            BlockState::Regular
        }
    }

    pub fn is_linked(&self) -> bool {
        self.reference_id.is_some()
    }

    pub fn is_system_prompt(&self) -> bool {
        self.kind == SYSTEM_PROMPT_KIND
    }

    /// Replace own content and refresh the derived hash and token count.
    /// Turns the block REGULAR.
    pub fn set_content(&mut self, content: &str) {
        self.reference_id = None;
        self.content = content.to_string();
        self.content_hash = hash_for(content);
        self.token_count = estimate_tokens(content);
    }
}

/// The stored hash for a piece of content: `None` for empty content.
pub fn hash_for(content: &str) -> Option<String> {
    if content.is_empty() {
        None
    } else {
        Some(content_hash(content))
    }
}
