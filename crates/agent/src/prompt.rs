//! System prompt construction.

use fnrouter_core::capability::CapabilityRegistry;

/// Opening lines of every router prompt.
pub const ROUTER_PREAMBLE: &str = "You are a function router.\n\
At each step, return ONLY ONE action in valid JSON.\n\
Never return arrays, only one object like this:";

/// The closing rules. Part of the response contract, sent verbatim.
pub const RESPONSE_RULES: &str = "Rules:\n\
- Respond with a single JSON object with the keys \"function\", \"args\" and \"status\".\n\
- \"status\" must be one of \"continue\", \"retry\" or \"done\".\n\
- \"status\": \"continue\" means wait for the next step.\n\
- \"status\": \"retry\" means adjust the arguments and try again.\n\
- \"status\": \"done\" means the workflow is complete after this action.\n\
- Never return more than one action.\n\
- Do not explain, do not wrap the response in prose or code fences.";

/// Build the system turn for a run.
///
/// Lists every registered capability as `- name(params): description`, shows
/// an example action built from the first capability, and appends the
/// optional workflow rules before the fixed response rules.
pub fn build_system_prompt(registry: &CapabilityRegistry, workflow_rules: Option<&str>) -> String {
    let mut prompt = String::from(ROUTER_PREAMBLE);
    prompt.push_str("\n\n");
    prompt.push_str(&example_action(registry));
    prompt.push_str("\n\nValid functions:\n");

    if registry.is_empty() {
        prompt.push_str("- (none)\n");
    }
    for capability in registry.iter() {
        prompt.push_str(&format!(
            "- {}: {}\n",
            capability.signature(),
            capability.description()
        ));
    }

    if let Some(rules) = workflow_rules.map(str::trim).filter(|r| !r.is_empty()) {
        prompt.push_str("\nWorkflow rules:\n");
        prompt.push_str(rules);
        prompt.push('\n');
    }

    prompt.push('\n');
    prompt.push_str(RESPONSE_RULES);
    prompt
}

fn example_action(registry: &CapabilityRegistry) -> String {
    let Some(first) = registry.iter().next() else {
        return r#"{ "function": "<name>", "args": {}, "status": "continue" }"#.into();
    };

    let args: Vec<String> = first
        .parameters()
        .iter()
        .filter(|p| p.required)
        .map(|p| format!("\"{}\": \"...\"", p.name))
        .collect();
    let args = if args.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", args.join(", "))
    };

    format!(
        "{{ \"function\": \"{}\", \"args\": {args}, \"status\": \"continue\" }}",
        first.name()
    )
}
