/// Order key handed out for the first block in an empty zone.
pub const FIRST_ORDER_KEY: f64 = 1.0;

/// Adjacent order keys closer than this have lost usable precision.
pub const MIN_ORDER_GAP: f64 = 1e-9;

/// Kind tag for system-prompt blocks (extracted, never assembled as a zone message).
pub const SYSTEM_PROMPT_KIND: &str = "system_prompt";

/// Kind tag used when the caller does not name one.
pub const DEFAULT_KIND: &str = "note";

/// Separator between block contents inside one zone message.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Label prepended to the STABLE zone message.
pub const STABLE_LABEL: &str = "Reference Material:";

/// Label prepended to the WORKING zone message.
pub const WORKING_LABEL: &str = "Current Context:";

/// Sentinel "no-hash" value for empty content. Never matches a real hash.
pub const NO_HASH: &str = "-";
