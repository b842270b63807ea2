//! Per-component registration: a declaration that may only change while open.

use serde::Serialize;

use crate::descriptor::{ComponentDecl, ComponentKind};

/// Open until the owning context is initialized, Frozen afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Open,
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("{kind} `{name}` can no longer be modified: context already initialized")]
    Frozen { kind: ComponentKind, name: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    kind: ComponentKind,
    name: String,
    class: String,
    init_params: Vec<(String, String)>,
    mappings: Vec<String>,
    state: RegistrationState,
}

impl Registration {
    pub fn new(kind: ComponentKind, name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            class: class.into(),
            init_params: Vec::new(),
            mappings: Vec::new(),
            state: RegistrationState::Open,
        }
    }

    pub fn from_decl(kind: ComponentKind, decl: &ComponentDecl) -> Self {
        Self {
            init_params: decl.init_params.clone(),
            ..Self::new(kind, decl.name.as_str(), decl.class.as_str())
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn init_parameters(&self) -> &[(String, String)] {
        &self.init_params
    }

    /// Returns `Ok(false)` without overwriting when `name` is already set.
    pub fn set_init_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<bool, RegistrationError> {
        self.ensure_open()?;
        let name = name.into();
        if self.init_parameter(&name).is_some() {
            return Ok(false);
        }
        self.init_params.push((name, value.into()));
        Ok(true)
    }

    /// Sets every parameter not already present; returns the names that conflicted.
    pub fn set_init_parameters<I, K, V>(&mut self, params: I) -> Result<Vec<String>, RegistrationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.ensure_open()?;
        let mut conflicts = Vec::new();
        for (name, value) in params {
            let name = name.into();
            if !self.set_init_parameter(name.clone(), value)? {
                conflicts.push(name);
            }
        }
        Ok(conflicts)
    }

    /// Patterns bound to this component, in the order they were added.
    pub fn mappings(&self) -> &[String] {
        &self.mappings
    }

    pub fn add_mapping(&mut self, pattern: impl Into<String>) -> Result<(), RegistrationError> {
        self.ensure_open()?;
        self.mappings.push(pattern.into());
        Ok(())
    }

    pub(crate) fn record_mapping(&mut self, pattern: impl Into<String>) {
        self.mappings.push(pattern.into());
    }

    pub fn freeze(&mut self) {
        self.state = RegistrationState::Frozen;
    }

    fn ensure_open(&self) -> Result<(), RegistrationError> {
        match self.state {
            RegistrationState::Open => Ok(()),
            RegistrationState::Frozen => Err(RegistrationError::Frozen {
                kind: self.kind,
                name: self.name.clone(),
            }),
        }
    }
}
