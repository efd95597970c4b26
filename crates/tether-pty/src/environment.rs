//! Default environment for children started without an explicit one.

/// Terminal type advertised to children unless configured otherwise.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Computes the environment a child gets when the caller supplies none.
pub trait EnvironmentPolicy: Send + Sync {
    fn default_environment(&self) -> Vec<(String, String)>;
}

/// Inherit the parent's environment, overriding `TERM`.
#[derive(Debug, Clone)]
pub struct InheritedEnvironment {
    term: String,
}

impl InheritedEnvironment {
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into() }
    }
}

impl Default for InheritedEnvironment {
    fn default() -> Self {
        Self::new(DEFAULT_TERM)
    }
}

impl EnvironmentPolicy for InheritedEnvironment {
    fn default_environment(&self) -> Vec<(String, String)> {
        with_term(std::env::vars(), &self.term)
    }
}

/// A conservative allowlist for children that should not see the host's
/// credentials or tooling configuration.
pub const STANDARD_ALLOWED_VARS: &[&str] = &[
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "PATH",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "DISPLAY",
    "WAYLAND_DISPLAY",
    "XDG_RUNTIME_DIR",
    "TMPDIR",
];

/// Inherit only a fixed set of parent variables, plus `TERM`.
///
/// Keeps credentials and other process-private settings of the host out of
/// the child's environment.
#[derive(Debug, Clone)]
pub struct AllowlistEnvironment {
    allowed: Vec<String>,
    term: String,
}

impl AllowlistEnvironment {
    pub fn new<I, S>(allowed: I, term: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            term: term.into(),
        }
    }
}

impl EnvironmentPolicy for AllowlistEnvironment {
    fn default_environment(&self) -> Vec<(String, String)> {
        let vars = self
            .allowed
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)));
        with_term(vars, &self.term)
    }
}

fn with_term<I>(vars: I, term: &str) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: Vec<(String, String)> = vars.into_iter().filter(|(k, _)| k != "TERM").collect();
    env.push(("TERM".to_string(), term.to_string()));
    env
}
