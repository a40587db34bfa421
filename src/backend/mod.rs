//! Backend descriptors and the registry that resolves execution requests to
//! one of them. Descriptors are provisioned elsewhere (gateway config for
//! system backends, the user-preferences surface for user backends); this
//! module only reads them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Wire-protocol family of a backend. Carried on every descriptor so the
/// orchestrator can pick the matching adapter without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Ollama => "ollama",
            Protocol::OpenAiCompatible => "openai_compatible",
        }
    }
}

/// Visibility of a backend: system backends are visible to every caller,
/// user backends only to their owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    System,
    User(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub id: String,
    pub display_name: String,
    pub protocol: Protocol,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub scope: Scope,
}

impl BackendDescriptor {
    /// Base URL without the trailing slash the admin UI tends to leave in.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// An explicit backend choice on an execution request. System and user ids
/// live in disjoint namespaces, distinguished by the scope prefix of the
/// wire form (`system:<id>` / `user:<id>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelector {
    System(String),
    User(String),
}

impl BackendSelector {
    pub fn parse(raw: &str) -> Option<Self> {
        let (scope, id) = raw.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        match scope {
            "system" => Some(BackendSelector::System(id.to_string())),
            "user" => Some(BackendSelector::User(id.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSelector::System(id) => write!(f, "system:{id}"),
            BackendSelector::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// The set of known backends. The gateway holds one behind a lock and swaps
/// it wholesale on reload, so readers always observe a consistent set.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    system: Vec<BackendDescriptor>,
    user: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    /// Build a registry from system backends, preserving configuration order
    /// (the first entry is the default when no selector is given).
    pub fn new(mut system: Vec<BackendDescriptor>) -> Self {
        for backend in &mut system {
            backend.scope = Scope::System;
        }
        Self {
            system,
            user: Vec::new(),
        }
    }

    pub fn set_user_backends(&mut self, backends: Vec<BackendDescriptor>) {
        self.user = backends;
    }

    pub fn system_backends(&self) -> &[BackendDescriptor] {
        &self.system
    }

    pub fn user_backends(&self) -> &[BackendDescriptor] {
        &self.user
    }

    /// Backends the caller may select: all system backends plus their own.
    pub fn visible_to(&self, caller: Option<&str>) -> Vec<BackendDescriptor> {
        let mut out = self.system.clone();
        if let Some(user_id) = caller {
            out.extend(
                self.user
                    .iter()
                    .filter(|b| matches!(&b.scope, Scope::User(owner) if owner == user_id))
                    .cloned(),
            );
        }
        out
    }

    /// Resolve a selector for a caller. An absent selector falls back to the
    /// first system backend in configuration order. An id that does not exist
    /// or belongs to another user's scope is `BackendNotFound`, never a
    /// silent substitute.
    pub fn resolve(
        &self,
        selector: Option<&BackendSelector>,
        caller: Option<&str>,
    ) -> Result<&BackendDescriptor, GatewayError> {
        match selector {
            None => self.system.first().ok_or_else(|| GatewayError::BackendNotFound {
                selector: "<default>".to_string(),
            }),
            Some(BackendSelector::System(id)) => self
                .system
                .iter()
                .find(|b| &b.id == id)
                .ok_or_else(|| GatewayError::BackendNotFound {
                    selector: format!("system:{id}"),
                }),
            Some(BackendSelector::User(id)) => self
                .user
                .iter()
                .find(|b| {
                    &b.id == id
                        && matches!(&b.scope, Scope::User(owner) if Some(owner.as_str()) == caller)
                })
                .ok_or_else(|| GatewayError::BackendNotFound {
                    selector: format!("user:{id}"),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_backend(id: &str) -> BackendDescriptor {
        BackendDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            protocol: Protocol::Ollama,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            default_model: "llama3".to_string(),
            scope: Scope::System,
        }
    }

    fn user_backend(id: &str, owner: &str) -> BackendDescriptor {
        BackendDescriptor {
            scope: Scope::User(owner.to_string()),
            protocol: Protocol::OpenAiCompatible,
            ..system_backend(id)
        }
    }

    #[test]
    fn selector_parses_scope_prefixes() {
        assert_eq!(
            BackendSelector::parse("system:corp"),
            Some(BackendSelector::System("corp".to_string()))
        );
        assert_eq!(
            BackendSelector::parse("user:abc-123"),
            Some(BackendSelector::User("abc-123".to_string()))
        );
        assert_eq!(BackendSelector::parse("corp"), None);
        assert_eq!(BackendSelector::parse("admin:corp"), None);
        assert_eq!(BackendSelector::parse("system:"), None);
    }

    #[test]
    fn absent_selector_resolves_first_system_backend() {
        let registry =
            BackendRegistry::new(vec![system_backend("first"), system_backend("second")]);
        let resolved = registry.resolve(None, None).unwrap();
        assert_eq!(resolved.id, "first");
    }

    #[test]
    fn absent_selector_with_no_system_backends_is_not_found() {
        let registry = BackendRegistry::default();
        assert!(matches!(
            registry.resolve(None, None),
            Err(GatewayError::BackendNotFound { .. })
        ));
    }

    #[test]
    fn system_selector_resolves_by_id() {
        let registry =
            BackendRegistry::new(vec![system_backend("first"), system_backend("second")]);
        let selector = BackendSelector::System("second".to_string());
        assert_eq!(registry.resolve(Some(&selector), None).unwrap().id, "second");
    }

    #[test]
    fn user_selector_requires_matching_owner() {
        let mut registry = BackendRegistry::new(vec![system_backend("sys")]);
        registry.set_user_backends(vec![user_backend("mine", "alice")]);

        let selector = BackendSelector::User("mine".to_string());
        assert_eq!(
            registry.resolve(Some(&selector), Some("alice")).unwrap().id,
            "mine"
        );
        // Another user's backend is a hard miss, never a fallback.
        assert!(matches!(
            registry.resolve(Some(&selector), Some("bob")),
            Err(GatewayError::BackendNotFound { .. })
        ));
        assert!(matches!(
            registry.resolve(Some(&selector), None),
            Err(GatewayError::BackendNotFound { .. })
        ));
    }

    #[test]
    fn visibility_is_scoped_to_the_caller() {
        let mut registry = BackendRegistry::new(vec![system_backend("sys")]);
        registry.set_user_backends(vec![
            user_backend("mine", "alice"),
            user_backend("theirs", "bob"),
        ]);

        let visible: Vec<String> = registry
            .visible_to(Some("alice"))
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(visible, vec!["sys".to_string(), "mine".to_string()]);
    }

    #[test]
    fn trimmed_base_url_strips_trailing_slash() {
        let mut backend = system_backend("s");
        backend.base_url = "http://localhost:11434/".to_string();
        assert_eq!(backend.trimmed_base_url(), "http://localhost:11434");
    }
}
