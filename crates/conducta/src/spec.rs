//! Specifications: a proposition plus everything needed to check it.

use crate::action::ActionTemplate;
use crate::formula::{Dependencies, Formula, OperatorDef};
use crate::query::{QueryAssertion, Selector};
use crate::result::{ConstructionError, SpecError};
use crate::typecheck;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// An already-parsed specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specification {
    /// Element whose presence means the page is ready
    pub ready: Selector,
    /// Proposition checked over every behavior
    pub proposition: Formula,
    /// User-defined operators
    #[serde(default)]
    pub operators: Vec<OperatorDef>,
    /// Actions the generator may take
    #[serde(default)]
    pub actions: Vec<ActionTemplate>,
    /// Named query assertions, referenced by `helper(name)`
    #[serde(default)]
    pub helpers: BTreeMap<String, QueryAssertion>,
}

impl Specification {
    /// Create a specification with no operators, actions or helpers
    #[must_use]
    pub fn new(ready: impl Into<Selector>, proposition: Formula) -> Self {
        Self {
            ready: ready.into(),
            proposition,
            operators: Vec::new(),
            actions: Vec::new(),
            helpers: BTreeMap::new(),
        }
    }

    /// Add an operator definition
    #[must_use]
    pub fn with_operator(mut self, operator: OperatorDef) -> Self {
        self.operators.push(operator);
        self
    }

    /// Add an action template
    #[must_use]
    pub fn with_action(mut self, action: ActionTemplate) -> Self {
        self.actions.push(action);
        self
    }

    /// Register a named query assertion.
    ///
    /// This is the only way to use `Satisfies` predicates, which cannot be
    /// written in a document.
    #[must_use]
    pub fn with_helper(mut self, name: impl Into<String>, helper: QueryAssertion) -> Self {
        self.helpers.insert(name.into(), helper);
        self
    }

    /// Parse a YAML (or JSON) document
    pub fn from_yaml(source: &str) -> Result<Self, SpecError> {
        serde_yaml_ng::from_str(source).map_err(|e| SpecError::Parse {
            message: e.to_string(),
        })
    }

    /// Read and parse a document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String, SpecError> {
        serde_yaml_ng::to_string(self).map_err(|e| SpecError::Parse {
            message: e.to_string(),
        })
    }

    /// Run every construction check
    pub fn validate(self) -> Result<ValidatedSpec, ConstructionError> {
        let checked = typecheck::check(&self)?;
        let mut dependencies = Dependencies::default();
        dependencies.selectors.insert(self.ready.clone());
        dependencies.collect(&self.proposition);
        for operator in &self.operators {
            dependencies.collect(&operator.body);
        }
        for helper in self.helpers.values() {
            dependencies.selectors.insert(helper.query.selector().clone());
            if let Some(style) = helper.query.style_name() {
                dependencies.styles.insert(style.to_string());
            }
        }
        for template in &self.actions {
            if let Some(selector) = &template.selector {
                dependencies.selectors.insert(selector.clone());
            }
        }
        tracing::debug!(
            target: "conducta::spec",
            selectors = dependencies.selectors.len(),
            styles = dependencies.styles.len(),
            operators = checked.order.len(),
            "specification validated"
        );
        Ok(ValidatedSpec {
            spec: self,
            dependencies,
            operator_order: checked.order,
            patterns: checked.patterns,
        })
    }
}

/// A specification that passed every construction check.
///
/// This is the only form the checker and evaluator accept.
#[derive(Debug, Clone)]
pub struct ValidatedSpec {
    spec: Specification,
    dependencies: Dependencies,
    operator_order: Vec<String>,
    patterns: BTreeMap<String, Regex>,
}

impl ValidatedSpec {
    /// The underlying specification
    #[must_use]
    pub const fn spec(&self) -> &Specification {
        &self.spec
    }

    /// Proposition
    #[must_use]
    pub const fn proposition(&self) -> &Formula {
        &self.spec.proposition
    }

    /// Ready condition
    #[must_use]
    pub const fn ready(&self) -> &Selector {
        &self.spec.ready
    }

    /// Action templates
    #[must_use]
    pub fn actions(&self) -> &[ActionTemplate] {
        &self.spec.actions
    }

    /// Everything the executor must capture in each state
    #[must_use]
    pub const fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Operators in dependency order (callees before callers)
    #[must_use]
    pub fn operator_order(&self) -> &[String] {
        &self.operator_order
    }

    /// Look up an operator
    #[must_use]
    pub fn operator(&self, name: &str) -> Option<&OperatorDef> {
        self.spec.operators.iter().find(|op| op.name == name)
    }

    /// Look up a helper
    #[must_use]
    pub fn helper(&self, name: &str) -> Option<&QueryAssertion> {
        self.spec.helpers.get(name)
    }

    /// Compiled regular expression for a pattern used in the formula
    #[must_use]
    pub fn pattern(&self, source: &str) -> Option<&Regex> {
        self.patterns.get(source)
    }
}
