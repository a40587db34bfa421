//! Prompt assembly: placeholder scanning, validation, variable substitution
//! and document inlining. Everything here is pure text manipulation; the
//! orchestrator decides when each step runs and what gets logged.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One name/value pair supplied for an execution. `from_catalog` marks values
/// resolved through the external cockpit catalog; it only affects how the
/// substitution log entry describes the variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub from_catalog: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            from_catalog: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub missing: Vec<String>,
    pub required: Vec<String>,
    pub provided: Vec<String>,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("placeholder pattern is valid"))
}

/// Distinct placeholder names appearing in the template, braces stripped.
pub fn scan_placeholders(template_text: &str) -> BTreeSet<String> {
    placeholder_re()
        .captures_iter(template_text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Check that every placeholder in the template has a supplied variable.
/// Runs before dispatch; a failing report must never reach the network layer.
pub fn validate(template_text: &str, variables: &[Variable]) -> ValidationReport {
    let required = scan_placeholders(template_text);
    let provided: BTreeSet<String> = variables.iter().map(|v| v.name.clone()).collect();
    let missing: Vec<String> = required.difference(&provided).cloned().collect();

    ValidationReport {
        is_valid: missing.is_empty(),
        missing,
        required: required.into_iter().collect(),
        provided: provided.into_iter().collect(),
    }
}

/// Replace every `{name}` occurrence that has a supplied value. Single pass
/// over the original template text: substituted values are never re-scanned,
/// so a value that itself reads `{other}` stays literal. Unknown placeholders
/// are left untouched, extra variables are a no-op, duplicate names are
/// last-write-wins.
pub fn substitute(template_text: &str, variables: &[Variable]) -> String {
    let mut values: HashMap<&str, &str> = HashMap::new();
    for variable in variables {
        values.insert(variable.name.as_str(), variable.value.as_str());
    }

    let mut out = String::with_capacity(template_text.len());
    let mut last = 0;
    for m in placeholder_re().find_iter(template_text) {
        let name = &template_text[m.start() + 1..m.end() - 1];
        if let Some(value) = values.get(name) {
            out.push_str(&template_text[last..m.start()]);
            out.push_str(value);
            last = m.end();
        }
    }
    out.push_str(&template_text[last..]);
    out
}

/// Append externally-extracted document texts after the prompt, each inside
/// a numbered delimiter block, in list order. Extraction failures arrive as
/// already-degraded inline error text, so this never fails.
pub fn inline_documents(prompt: &str, file_texts: &[String]) -> String {
    if file_texts.is_empty() {
        return prompt.to_string();
    }

    let mut out = prompt.to_string();
    for (i, text) in file_texts.iter().enumerate() {
        let n = i + 1;
        out.push_str(&format!(
            "\n\n--- DOCUMENT {n} ---\n{text}\n--- END DOCUMENT {n} ---"
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<Variable> {
        pairs.iter().map(|(n, v)| Variable::new(*n, *v)).collect()
    }

    #[test]
    fn scan_collapses_duplicates_and_strips_braces() {
        let found = scan_placeholders("{a} and {b} and {a} again");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn scan_of_empty_input_is_empty() {
        assert!(scan_placeholders("").is_empty());
        assert!(scan_placeholders("no placeholders here").is_empty());
    }

    #[test]
    fn validate_accepts_superset_of_required() {
        let report = validate(
            "Hello {name}",
            &vars(&[("name", "Acme"), ("extra", "unused")]),
        );
        assert!(report.is_valid);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn validate_reports_exactly_the_missing_names() {
        let report = validate(
            "Hello {name}, sector {sector}",
            &vars(&[("name", "Acme")]),
        );
        assert!(!report.is_valid);
        assert_eq!(report.missing, vec!["sector".to_string()]);
        assert_eq!(
            report.required,
            vec!["name".to_string(), "sector".to_string()]
        );
        assert_eq!(report.provided, vec!["name".to_string()]);
    }

    #[test]
    fn substitute_replaces_every_occurrence() {
        let out = substitute("{x} then {x}", &vars(&[("x", "1")]));
        assert_eq!(out, "1 then 1");
    }

    #[test]
    fn substitute_is_idempotent_for_brace_free_values() {
        let template = "Hello {name}, sector {sector}";
        let variables = vars(&[("name", "Acme"), ("sector", "energy")]);
        let once = substitute(template, &variables);
        let twice = substitute(&once, &variables);
        assert_eq!(once, twice);
    }

    #[test]
    fn substitute_never_recurses_into_values() {
        let out = substitute(
            "{a} {b}",
            &vars(&[("a", "{b}"), ("b", "resolved")]),
        );
        // The substituted value `{b}` must stay literal.
        assert_eq!(out, "{b} resolved");
    }

    #[test]
    fn substitute_inserts_braces_verbatim() {
        let out = substitute("{json}", &vars(&[("json", "{\"k\": 1}")]));
        assert_eq!(out, "{\"k\": 1}");
    }

    #[test]
    fn substitute_leaves_unknown_placeholders_untouched() {
        let out = substitute("Hello {name} from {city}", &vars(&[("name", "Acme")]));
        assert_eq!(out, "Hello Acme from {city}");
    }

    #[test]
    fn substitute_duplicate_names_last_write_wins() {
        let out = substitute("{x}", &vars(&[("x", "first"), ("x", "second")]));
        assert_eq!(out, "second");
    }

    #[test]
    fn inline_preserves_document_order() {
        let out = inline_documents(
            "prompt",
            &["alpha".to_string(), "beta".to_string()],
        );
        let a = out.find("--- DOCUMENT 1 ---\nalpha\n--- END DOCUMENT 1 ---");
        let b = out.find("--- DOCUMENT 2 ---\nbeta\n--- END DOCUMENT 2 ---");
        assert!(a.is_some() && b.is_some());
        assert!(a < b);
        assert!(out.starts_with("prompt"));
    }

    #[test]
    fn inline_with_no_documents_is_a_noop() {
        assert_eq!(inline_documents("prompt", &[]), "prompt");
    }
}
