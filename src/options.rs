//! Runtime options of a container.

use std::env;

/// Environment variable overriding [`ContainerOptions::name`].
pub const ENV_CONTAINER_NAME: &str = "INDIRECTX_CONTAINER_NAME";
/// Environment variable overriding [`ContainerOptions::catch_builder_panics`].
pub const ENV_CATCH_PANICS: &str = "INDIRECTX_CATCH_PANICS";
/// Environment variable overriding [`ContainerOptions::warn_on_undisposed`].
pub const ENV_WARN_UNDISPOSED: &str = "INDIRECTX_WARN_UNDISPOSED";

/// Options controlling container behavior that is not part of the node tree.
///
/// # Examples
///
/// ```
/// use indirectx::ContainerOptions;
///
/// let options = ContainerOptions::default()
///     .with_name("orders")
///     .catch_builder_panics(false);
///
/// assert_eq!(options.name, "orders");
/// assert!(!options.catch_builder_panics);
/// assert!(options.warn_on_undisposed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Name attached to every log line of the container
    pub name: String,
    /// Turn builder panics into [`ResolveError::BuilderPanicked`](crate::ResolveError::BuilderPanicked)
    pub catch_builder_panics: bool,
    /// Log a warning when a container is dropped without `dispose_all`
    pub warn_on_undisposed: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            name: "container".to_string(),
            catch_builder_panics: true,
            warn_on_undisposed: true,
        }
    }
}

impl ContainerOptions {
    /// Defaults overridden by the `INDIRECTX_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(name) = lookup(ENV_CONTAINER_NAME) {
            options.name = name;
        }
        if let Some(flag) = lookup(ENV_CATCH_PANICS).and_then(|raw| parse_flag(ENV_CATCH_PANICS, &raw)) {
            options.catch_builder_panics = flag;
        }
        if let Some(flag) = lookup(ENV_WARN_UNDISPOSED).and_then(|raw| parse_flag(ENV_WARN_UNDISPOSED, &raw)) {
            options.warn_on_undisposed = flag;
        }
        options
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn catch_builder_panics(mut self, enabled: bool) -> Self {
        self.catch_builder_panics = enabled;
        self
    }

    pub fn warn_on_undisposed(mut self, enabled: bool) -> Self {
        self.warn_on_undisposed = enabled;
        self
    }
}

fn parse_flag(key: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = raw, "ignoring unparseable flag");
            None
        }
    }
}
