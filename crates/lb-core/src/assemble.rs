//! Zone-ordered prompt assembly.
//!
//! PERMANENT, then STABLE, then WORKING, one message per non-empty zone,
//! then prior turns, then the new prompt. Output depends only on the block
//! set and its order keys, so the PERMANENT/STABLE prefix is byte-stable
//! across calls and stays cacheable upstream.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::block::{Block, Zone};
use crate::constants::{BLOCK_SEPARATOR, STABLE_LABEL, WORKING_LABEL};
use crate::tokenizer::estimate_tokens;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-zone accounting for one assembly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStats {
    pub blocks: usize,
    pub tokens: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMetrics {
    pub permanent: ZoneStats,
    pub stable: ZoneStats,
    pub working: ZoneStats,
}

impl ZoneMetrics {
    pub fn total_tokens(&self) -> usize {
        self.permanent.tokens + self.stable.tokens + self.working.tokens
    }

    fn zone_mut(&mut self, zone: Zone) -> &mut ZoneStats {
        match zone {
            Zone::Permanent => &mut self.permanent,
            Zone::Stable => &mut self.stable,
            Zone::Working => &mut self.working,
        }
    }
}

/// Result of [`assemble`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    /// Active system prompt content, delivered separately from `messages`.
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub metrics: ZoneMetrics,
}

/// Sibling order: ascending order key, ties broken by id.
fn by_position(a: &&Block, b: &&Block) -> Ordering {
    a.order_key
        .total_cmp(&b.order_key)
        .then_with(|| a.id.cmp(&b.id))
}

/// The active system prompt: lowest-ordered PERMANENT block of the
/// system-prompt kind. Expects resolved blocks.
pub fn extract_system_prompt(blocks: &[Block]) -> Option<&Block> {
    blocks
        .iter()
        .filter(|b| b.zone == Zone::Permanent && b.is_system_prompt())
        .min_by(by_position)
}

fn zone_message(zone: Zone, body: String) -> Message {
    match zone {
        Zone::Permanent => Message::user(body),
        Zone::Stable => Message::user(format!("{STABLE_LABEL}{BLOCK_SEPARATOR}{body}")),
        Zone::Working => Message::user(format!("{WORKING_LABEL}{BLOCK_SEPARATOR}{body}")),
    }
}

/// Assemble a workspace's resolved blocks into an ordered message list.
///
/// System-prompt blocks never appear in `messages`; the active one is
/// returned in `system_prompt`. A zone with no non-empty content emits no
/// message, so no message is ever an empty string or a bare label.
pub fn assemble(blocks: &[Block], prompt: &str, history: Option<&[Message]>) -> AssembledPrompt {
    let mut metrics = ZoneMetrics::default();
    let mut messages = Vec::new();

    for zone in Zone::ALL {
        let mut members: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.zone == zone && !b.is_system_prompt())
            .collect();
        if members.is_empty() {
            continue;
        }
        members.sort_by(by_position);

        // dangling links and blank blocks resolve to "" and contribute nothing
        let parts: Vec<&str> = members
            .iter()
            .map(|b| b.content.as_str())
            .filter(|c| !c.is_empty())
            .collect();

        let stats = metrics.zone_mut(zone);
        stats.blocks = members.len();
        if parts.is_empty() {
            continue;
        }
        let body = parts.join(BLOCK_SEPARATOR);
        stats.tokens = estimate_tokens(&body);

        messages.push(zone_message(zone, body));
    }

    if let Some(turns) = history {
        messages.extend(turns.iter().cloned());
    }
    messages.push(Message::user(prompt));

    AssembledPrompt {
        system_prompt: extract_system_prompt(blocks).map(|b| b.content.clone()),
        messages,
        metrics,
    }
}
