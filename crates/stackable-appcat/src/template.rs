//! `${variable}` substitution for connection secret templates.
//!
//! Templates are declared by the service configuration, not by users, so
//! unknown placeholders are not an error. They are left in the output as they
//! were written.
use std::collections::BTreeMap;

const PLACEHOLDER_START: &str = "${";
const PLACEHOLDER_END: char = '}';

/// The name of the variable holding the instance name.
pub const INSTANCE_NAME: &str = "instanceName";
/// The name of the variable holding the instance namespace.
pub const NAMESPACE: &str = "namespace";
/// The name of the variable holding the generated credential.
pub const PASSWORD: &str = "password";
/// The name of the variable holding the connection secret name.
pub const SECRET_NAME: &str = "secretName";
/// The name of the variable holding the connection secret namespace.
pub const SECRET_NAMESPACE: &str = "secretNamespace";

/// Returns the placeholder referencing `variable`, e.g. `${password}`.
pub fn placeholder(variable: &str) -> String {
    format!("{PLACEHOLDER_START}{variable}{PLACEHOLDER_END}")
}

/// The variables available to a template.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables(BTreeMap<String, String>);

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

// Variable values include the generated credential.
impl std::fmt::Debug for TemplateVariables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TemplateVariables {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Replaces every `${name}` in `template` whose name is a known variable.
///
/// The template is scanned once from left to right. Substituted values are
/// copied as-is and never scanned again, so a value containing `${...}` does
/// not expand further. Unknown placeholders and an unterminated `${` are kept
/// verbatim, but a known placeholder nested in them is still replaced.
///
/// ```
/// use stackable_appcat::template::{TemplateVariables, render};
///
/// let variables = TemplateVariables::new()
///     .with("password", "p1")
///     .with("instanceName", "my-redis");
///
/// assert_eq!(
///     render("redis://:${password}@${instanceName}:6379", &variables),
///     "redis://:p1@my-redis:6379"
/// );
/// ```
pub fn render(template: &str, variables: &TemplateVariables) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(PLACEHOLDER_START) {
        rendered.push_str(&rest[..start]);
        let after_start = &rest[start + PLACEHOLDER_START.len()..];

        let Some(end) = after_start.find(PLACEHOLDER_END) else {
            // Unterminated, keep the remainder as written
            rest = &rest[start..];
            break;
        };

        match variables.get(&after_start[..end]) {
            Some(value) => {
                rendered.push_str(value);
                rest = &after_start[end + 1..];
            }
            None => {
                // The next placeholder may start inside the unknown name
                rendered.push_str(PLACEHOLDER_START);
                rest = after_start;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn variables() -> TemplateVariables {
        TemplateVariables::new()
            .with(INSTANCE_NAME, "my-redis")
            .with(NAMESPACE, "ns1")
            .with(PASSWORD, "p1")
    }

    #[rstest]
    #[case(
        "redis://:${password}@${instanceName}:6379",
        "redis://:p1@my-redis:6379"
    )]
    #[case("redis://${instanceName}:6379", "redis://my-redis:6379")]
    #[case(
        "${instanceName}-master.${namespace}.svc",
        "my-redis-master.ns1.svc"
    )]
    #[case("${password}", "p1")]
    #[case("${password}${password}", "p1p1")]
    #[case("no placeholders", "no placeholders")]
    #[case("", "")]
    fn render_known_variables(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(render(template, &variables()), expected);
    }

    #[rstest]
    #[case("${unknown}", "${unknown}")]
    #[case("a-${unknown}-${instanceName}", "a-${unknown}-my-redis")]
    #[case("${}", "${}")]
    #[case("${instanceName", "${instanceName")]
    #[case("${password}-${", "p1-${")]
    #[case("${x ${password}", "${x p1")]
    #[case("${${instanceName}}", "${my-redis}")]
    #[case("$instanceName", "$instanceName")]
    #[case("{instanceName}", "{instanceName}")]
    fn render_leaves_unknown_placeholders(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(render(template, &variables()), expected);
    }

    #[test]
    fn substituted_values_are_not_expanded() {
        let variables = TemplateVariables::new()
            .with(PASSWORD, "${instanceName}")
            .with(INSTANCE_NAME, "my-redis");

        assert_eq!(
            render("${password}@${instanceName}", &variables),
            "${instanceName}@my-redis"
        );
    }

    #[test]
    fn debug_output_hides_values() {
        let debug = format!("{:?}", variables());

        assert!(debug.contains(PASSWORD));
        assert!(!debug.contains("p1"));
    }

    #[test]
    fn placeholder_for_variable() {
        assert_eq!(placeholder(PASSWORD), "${password}");
    }
}
