//! Routing hints: extra user turns appended after selected capabilities.
//!
//! Hints nudge the model toward the next step (e.g. "No docs found. Use
//! getRawDocs with url: ..."). They are annotations only and never change
//! whether the run continues.

use fnrouter_config::HintConfig;
use fnrouter_core::capability::CapabilityOutput;
use std::collections::HashMap;

/// Decides whether a successful step gets a follow-up hint turn.
pub trait HintPolicy: Send + Sync {
    /// Return the hint text for this step, if any.
    fn hint(&self, capability: &str, output: &CapabilityOutput) -> Option<String>;
}

/// Never hints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHints;

impl HintPolicy for NoHints {
    fn hint(&self, _capability: &str, _output: &CapabilityOutput) -> Option<String> {
        None
    }
}

/// One rule: which capability it watches and what to say.
#[derive(Debug, Clone, PartialEq)]
pub struct HintRule {
    pub capability: String,
    pub when_empty: Option<String>,
    pub when_present: Option<String>,
}

impl HintRule {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            when_empty: None,
            when_present: None,
        }
    }

    pub fn when_empty(mut self, template: impl Into<String>) -> Self {
        self.when_empty = Some(template.into());
        self
    }

    pub fn when_present(mut self, template: impl Into<String>) -> Self {
        self.when_present = Some(template.into());
        self
    }
}

impl From<&HintConfig> for HintRule {
    fn from(config: &HintConfig) -> Self {
        Self {
            capability: config.capability.clone(),
            when_empty: config.when_empty.clone(),
            when_present: config.when_present.clone(),
        }
    }
}

/// Table-driven hints with `{var}` templates.
#[derive(Debug, Clone, Default)]
pub struct RuleHints {
    rules: Vec<HintRule>,
    vars: HashMap<String, String>,
}

impl RuleHints {
    pub fn new(rules: Vec<HintRule>) -> Self {
        Self {
            rules,
            vars: HashMap::new(),
        }
    }

    pub fn from_config(hints: &[HintConfig]) -> Self {
        Self::new(hints.iter().map(HintRule::from).collect())
    }

    /// Set a template variable, e.g. `url`.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rag-style retrieval hints.
    pub fn retrieval(fallback_url: impl Into<String>) -> Self {
        Self::new(vec![
            HintRule::new("retrieve")
                .when_present("Context found. Please summarize.")
                .when_empty("No docs found. Use getRawDocs with url: {url}"),
        ])
        .with_var("url", fallback_url)
    }
}

impl HintPolicy for RuleHints {
    fn hint(&self, capability: &str, output: &CapabilityOutput) -> Option<String> {
        let rule = self.rules.iter().find(|r| r.capability == capability)?;
        let template = if output.is_empty() {
            rule.when_empty.as_ref()
        } else {
            rule.when_present.as_ref()
        }?;
        Some(render(template, &self.vars))
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are left as written.
fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if vars.contains_key(&after[..close]) => {
                out.push_str(&vars[&after[..close]]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_hints_follow_result_emptiness() {
        let hints = RuleHints::retrieval("https://lilianweng.github.io/posts/2023-06-23-agent");

        assert_eq!(
            hints.hint("retrieve", &CapabilityOutput::text("")).as_deref(),
            Some("No docs found. Use getRawDocs with url: https://lilianweng.github.io/posts/2023-06-23-agent")
        );
        assert_eq!(
            hints.hint("retrieve", &CapabilityOutput::text("  \n")).as_deref(),
            Some("No docs found. Use getRawDocs with url: https://lilianweng.github.io/posts/2023-06-23-agent")
        );
        assert_eq!(
            hints
                .hint("retrieve", &CapabilityOutput::text("Task decomposition is..."))
                .as_deref(),
            Some("Context found. Please summarize.")
        );
    }

    #[test]
    fn other_capabilities_get_no_hint() {
        let hints = RuleHints::retrieval("https://example.com");
        assert!(hints.hint("getRawDocs", &CapabilityOutput::text("")).is_none());
    }

    #[test]
    fn one_sided_rule() {
        let hints = RuleHints::new(vec![HintRule::new("runCommand").when_empty("The command printed nothing.")]);
        assert!(hints.hint("runCommand", &CapabilityOutput::text("ok")).is_none());
        assert_eq!(
            hints.hint("runCommand", &CapabilityOutput::text("")).as_deref(),
            Some("The command printed nothing.")
        );
    }

    #[test]
    fn no_hints_policy() {
        assert!(NoHints.hint("retrieve", &CapabilityOutput::text("")).is_none());
    }

    #[test]
    fn from_config_rules() {
        let config = vec![HintConfig {
            capability: "retrieve".into(),
            when_empty: Some("Fetch {url} for {topic}".into()),
            when_present: None,
        }];
        let hints = RuleHints::from_config(&config).with_vars([("url", "https://a.b"), ("topic", "agents")]);
        assert_eq!(
            hints.hint("retrieve", &CapabilityOutput::text("")).as_deref(),
            Some("Fetch https://a.b for agents")
        );
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let vars = HashMap::from([("url".to_string(), "https://x".to_string())]);
        assert_eq!(render("{url} {missing} {", &vars), "https://x {missing} {");
        assert_eq!(render("{{url}}", &vars), "{https://x}");
        assert_eq!(render("no placeholders", &vars), "no placeholders");
    }
}
