// Reserved Document Names
// Directive keys, well-known top-level keys and injected variables

/// Expands the enclosing mapping into one variant per list entry
pub const EXPLODE: &str = "%explode";

/// Replaced by the result of evaluating an expression string
pub const EVAL: &str = "%eval";

/// Replaced by the value found at a pointer into the same document
pub const LINK: &str = "%link";

/// Replaced by the parsed contents of another document file
pub const LINK_FILE: &str = "%linkFile";

/// Fallback sibling of a `%link` marker
pub const LINK_DEFAULT: &str = "default";

/// Every directive key, in the order they are checked
pub const DIRECTIVES: [&str; 4] = [EXPLODE, EVAL, LINK, LINK_FILE];

/// Default location of the resource limits sub-document
pub const LIMITS_POINTER: &str = "/%limits";

/// Limits key holding a wall clock timeout in seconds
pub const LIMITS_TIMEOUT: &str = "timeout";

/// Variable injected with the directory of the originating file
pub const CONF_DIR_VAR: &str = "EXRUN_CONF_DIR";

pub const DEFAULT_CONFIGURATION: &str = "default_configuration";
pub const TOOLS: &str = "tools";
pub const CONFIGURATIONS: &str = "configurations";
pub const RUN_RESULTS: &str = "runResults";

/// Top-level keys that carry meaning for the runner
pub const KNOWN_ROOT_KEYS: [&str; 4] = [DEFAULT_CONFIGURATION, TOOLS, CONFIGURATIONS, CONF_DIR_VAR];

/// Whether a mapping key is one of the directive markers
pub fn is_directive(key: &str) -> bool {
    DIRECTIVES.contains(&key)
}
