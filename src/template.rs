//! Environment template expansion for release identity fields.
//!
//! Templates use the `{{.NAME}}` placeholder form. Every placeholder must
//! resolve against the supplied environment; a missing key is an error
//! rather than an empty substitution.

use std::collections::HashMap;

use crate::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Variables available to template expansion.
#[derive(Debug, Clone, Default)]
pub struct TemplateEnv {
    vars: HashMap<String, String>,
}

impl TemplateEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Adds or replaces a variable.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for TemplateEnv {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Expands every `{{.NAME}}` placeholder in `template` against `env`.
///
/// # Errors
///
/// Returns [`TemplateError::UnknownVariable`] for a placeholder with no
/// matching variable and [`TemplateError::Malformed`] for unterminated or
/// unsupported actions.
pub fn expand(template: &str, env: &TemplateEnv) -> Result<String, TemplateError> {
    if !template.contains(OPEN) {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(malformed(template, "unterminated action"));
        };

        let action = after_open[..end].trim();
        let Some(name) = action.strip_prefix('.') else {
            return Err(malformed(
                template,
                &format!("unsupported action {action:?}, expected {{{{.NAME}}}}"),
            ));
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(malformed(template, &format!("invalid variable name {name:?}")));
        }

        let value = env.get(name).ok_or_else(|| TemplateError::UnknownVariable {
            name: name.to_string(),
        })?;
        out.push_str(value);

        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Expands an optional field, leaving `None` untouched.
///
/// # Errors
///
/// Propagates errors from [`expand`].
pub fn expand_opt(
    template: Option<&str>,
    env: &TemplateEnv,
) -> Result<Option<String>, TemplateError> {
    template.map(|t| expand(t, env)).transpose()
}

fn malformed(template: &str, reason: &str) -> TemplateError {
    TemplateError::Malformed {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> TemplateEnv {
        TemplateEnv::new().with("PREFIX", "dev").with("TAG", "1.2.3")
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(expand("redis", &env()).unwrap(), "redis");
    }

    #[test]
    fn test_expands_placeholders() {
        assert_eq!(expand("{{.PREFIX}}-db", &env()).unwrap(), "dev-db");
        assert_eq!(expand("{{ .PREFIX }}/{{.TAG}}", &env()).unwrap(), "dev/1.2.3");
    }

    #[test]
    fn test_missing_variable_fails() {
        let err = expand("{{.NOPE}}", &env()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownVariable {
                name: String::from("NOPE")
            }
        );
    }

    #[test]
    fn test_unterminated_action() {
        assert!(matches!(
            expand("{{.PREFIX", &env()),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unsupported_action() {
        assert!(matches!(
            expand("{{ default \"x\" .PREFIX }}", &env()),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_expand_opt() {
        assert_eq!(expand_opt(None, &env()).unwrap(), None);
        assert_eq!(
            expand_opt(Some("v{{.TAG}}"), &env()).unwrap(),
            Some(String::from("v1.2.3"))
        );
    }
}
