//! Formula abstract syntax.
//!
//! A [`Formula`] is the already-parsed form of a proposition: first-order
//! logic with the temporal modalities `next`, `always` and `eventually`, web
//! queries over the current state, container literals and comprehensions,
//! and calls to user-defined non-recursive operators.
//!
//! Formulas are immutable data. They serialize with an `op` tag so a whole
//! specification can be stored as YAML or JSON:
//!
//! ```yaml
//! op: always
//! formula:
//!   op: implies
//!   left: { op: call, operator: confirming, args: [] }
//!   right: { op: helper, name: dialog_open }
//! ```

use crate::query::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ordering comparison over numbers or strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparison {
    /// Apply to an ordering of left against right
    #[must_use]
    pub const fn holds(self, ordering: std::cmp::Ordering) -> bool {
        match self {
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// A node of the formula language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    /// Boolean literal
    Bool {
        /// Literal value
        value: bool,
    },
    /// Number literal
    Number {
        /// Literal value
        value: f64,
    },
    /// String literal
    String {
        /// Literal value
        value: String,
    },
    /// Reference to a quantifier variable or operator parameter
    Var {
        /// Variable name
        name: String,
    },
    /// Negation
    Not {
        /// Operand
        formula: Box<Formula>,
    },
    /// Conjunction
    And {
        /// Left operand
        left: Box<Formula>,
        /// Right operand
        right: Box<Formula>,
    },
    /// Disjunction
    Or {
        /// Left operand
        left: Box<Formula>,
        /// Right operand
        right: Box<Formula>,
    },
    /// Implication
    Implies {
        /// Antecedent
        left: Box<Formula>,
        /// Consequent
        right: Box<Formula>,
    },
    /// Structural equality of any two values
    Equals {
        /// Left operand
        left: Box<Formula>,
        /// Right operand
        right: Box<Formula>,
    },
    /// Ordering comparison
    Compare {
        /// Comparison operator
        cmp: Comparison,
        /// Left operand
        left: Box<Formula>,
        /// Right operand
        right: Box<Formula>,
    },
    /// Universal quantifier
    Forall {
        /// Bound variable
        var: String,
        /// Set or sequence to range over
        domain: Box<Formula>,
        /// Body
        body: Box<Formula>,
    },
    /// Existential quantifier
    Exists {
        /// Bound variable
        var: String,
        /// Set or sequence to range over
        domain: Box<Formula>,
        /// Body
        body: Box<Formula>,
    },
    /// Value in the next state
    Next {
        /// Operand
        formula: Box<Formula>,
    },
    /// Holds in every remaining state
    Always {
        /// Operand
        formula: Box<Formula>,
    },
    /// Holds in some remaining state
    Eventually {
        /// Operand
        formula: Box<Formula>,
    },
    /// Elements matching a selector, in document order
    Query {
        /// Selector
        selector: Selector,
    },
    /// Text of an element
    Text {
        /// Element operand
        element: Box<Formula>,
    },
    /// Attribute of an element
    Attribute {
        /// Element operand
        element: Box<Formula>,
        /// Attribute name
        name: String,
    },
    /// Computed style property of an element
    Style {
        /// Element operand
        element: Box<Formula>,
        /// CSS property
        name: String,
    },
    /// Visibility of an element
    Visible {
        /// Element operand
        element: Box<Formula>,
    },
    /// Set literal
    Set {
        /// Elements
        items: Vec<Formula>,
    },
    /// Sequence literal
    Sequence {
        /// Elements
        items: Vec<Formula>,
    },
    /// `{x in S: p}`
    Filter {
        /// Bound variable
        var: String,
        /// Container to filter
        domain: Box<Formula>,
        /// Predicate
        predicate: Box<Formula>,
    },
    /// `{e for x in S}`
    Map {
        /// Bound variable
        var: String,
        /// Container to map over
        domain: Box<Formula>,
        /// Element expression
        body: Box<Formula>,
    },
    /// Size of a container, or characters of a string
    Length {
        /// Operand
        formula: Box<Formula>,
    },
    /// Regular expression test
    Matches {
        /// String operand
        formula: Box<Formula>,
        /// Pattern source
        pattern: String,
    },
    /// Application of a user-defined operator
    Call {
        /// Operator name
        operator: String,
        /// Positional arguments
        #[serde(default)]
        args: Vec<Formula>,
    },
    /// Named query assertion from the helper table
    Helper {
        /// Helper name
        name: String,
    },
    /// Label of the action that produced the current state
    Happened,
}

impl Formula {
    /// `true`
    #[must_use]
    pub const fn truth() -> Self {
        Self::Bool { value: true }
    }

    /// `false`
    #[must_use]
    pub const fn falsity() -> Self {
        Self::Bool { value: false }
    }

    /// Boolean literal
    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::Bool { value }
    }

    /// Number literal
    #[must_use]
    pub const fn number(value: f64) -> Self {
        Self::Number { value }
    }

    /// String literal
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String {
            value: value.into(),
        }
    }

    /// Variable reference
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var { name: name.into() }
    }

    /// `not p`
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(formula: Self) -> Self {
        Self::Not {
            formula: Box::new(formula),
        }
    }

    /// `p and q`
    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `p or q`
    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `p => q`
    #[must_use]
    pub fn implies(left: Self, right: Self) -> Self {
        Self::Implies {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `p == q`
    #[must_use]
    pub fn equals(left: Self, right: Self) -> Self {
        Self::Equals {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Ordering comparison
    #[must_use]
    pub fn compare(cmp: Comparison, left: Self, right: Self) -> Self {
        Self::Compare {
            cmp,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `forall var in domain: body`
    #[must_use]
    pub fn forall(var: impl Into<String>, domain: Self, body: Self) -> Self {
        Self::Forall {
            var: var.into(),
            domain: Box::new(domain),
            body: Box::new(body),
        }
    }

    /// `exists var in domain: body`
    #[must_use]
    pub fn exists(var: impl Into<String>, domain: Self, body: Self) -> Self {
        Self::Exists {
            var: var.into(),
            domain: Box::new(domain),
            body: Box::new(body),
        }
    }

    /// `next(p)`
    #[must_use]
    pub fn next(formula: Self) -> Self {
        Self::Next {
            formula: Box::new(formula),
        }
    }

    /// `always(p)`
    #[must_use]
    pub fn always(formula: Self) -> Self {
        Self::Always {
            formula: Box::new(formula),
        }
    }

    /// `eventually(p)`
    #[must_use]
    pub fn eventually(formula: Self) -> Self {
        Self::Eventually {
            formula: Box::new(formula),
        }
    }

    /// `query(selector)`
    #[must_use]
    pub fn query(selector: impl Into<Selector>) -> Self {
        Self::Query {
            selector: selector.into(),
        }
    }

    /// `e.text`
    #[must_use]
    pub fn text(element: Self) -> Self {
        Self::Text {
            element: Box::new(element),
        }
    }

    /// `e.attributes(name)`
    #[must_use]
    pub fn attribute(element: Self, name: impl Into<String>) -> Self {
        Self::Attribute {
            element: Box::new(element),
            name: name.into(),
        }
    }

    /// `e.style(name)`
    #[must_use]
    pub fn style(element: Self, name: impl Into<String>) -> Self {
        Self::Style {
            element: Box::new(element),
            name: name.into(),
        }
    }

    /// `e.visible`
    #[must_use]
    pub fn visible(element: Self) -> Self {
        Self::Visible {
            element: Box::new(element),
        }
    }

    /// `{a, b, ...}`
    #[must_use]
    pub fn set(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Set {
            items: items.into_iter().collect(),
        }
    }

    /// `[a, b, ...]`
    #[must_use]
    pub fn sequence(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Sequence {
            items: items.into_iter().collect(),
        }
    }

    /// `{var in domain: predicate}`
    #[must_use]
    pub fn filter(var: impl Into<String>, domain: Self, predicate: Self) -> Self {
        Self::Filter {
            var: var.into(),
            domain: Box::new(domain),
            predicate: Box::new(predicate),
        }
    }

    /// `{body for var in domain}`
    #[must_use]
    pub fn map(var: impl Into<String>, domain: Self, body: Self) -> Self {
        Self::Map {
            var: var.into(),
            domain: Box::new(domain),
            body: Box::new(body),
        }
    }

    /// `length(c)`
    #[must_use]
    pub fn length(formula: Self) -> Self {
        Self::Length {
            formula: Box::new(formula),
        }
    }

    /// `matches(s, pattern)`
    #[must_use]
    pub fn matches(formula: Self, pattern: impl Into<String>) -> Self {
        Self::Matches {
            formula: Box::new(formula),
            pattern: pattern.into(),
        }
    }

    /// `o(args...)`
    #[must_use]
    pub fn call(operator: impl Into<String>, args: impl IntoIterator<Item = Self>) -> Self {
        Self::Call {
            operator: operator.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Zero-argument operator reference
    #[must_use]
    pub fn constant(operator: impl Into<String>) -> Self {
        Self::call(operator, [])
    }

    /// `helper(name)`
    #[must_use]
    pub fn helper(name: impl Into<String>) -> Self {
        Self::Helper { name: name.into() }
    }

    /// Direct sub-formulas, left to right
    #[must_use]
    pub fn children(&self) -> Vec<&Self> {
        match self {
            Self::Bool { .. }
            | Self::Number { .. }
            | Self::String { .. }
            | Self::Var { .. }
            | Self::Query { .. }
            | Self::Helper { .. }
            | Self::Happened => Vec::new(),
            Self::Not { formula }
            | Self::Next { formula }
            | Self::Always { formula }
            | Self::Eventually { formula }
            | Self::Length { formula }
            | Self::Matches { formula, .. } => vec![formula.as_ref()],
            Self::Text { element }
            | Self::Attribute { element, .. }
            | Self::Style { element, .. }
            | Self::Visible { element } => vec![element.as_ref()],
            Self::And { left, right }
            | Self::Or { left, right }
            | Self::Implies { left, right }
            | Self::Equals { left, right }
            | Self::Compare { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Forall { domain, body, .. }
            | Self::Exists { domain, body, .. }
            | Self::Map { domain, body, .. } => vec![domain.as_ref(), body.as_ref()],
            Self::Filter {
                domain, predicate, ..
            } => vec![domain.as_ref(), predicate.as_ref()],
            Self::Set { items } | Self::Sequence { items } | Self::Call { args: items, .. } => {
                items.iter().collect()
            }
        }
    }

    /// Visit this formula and every sub-formula, pre-order
    pub fn walk<'f>(&'f self, visit: &mut impl FnMut(&'f Self)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Whether the formula syntactically contains a temporal modality.
    ///
    /// Operator calls are not followed; the construction checks handle those.
    #[must_use]
    pub fn has_modality(&self) -> bool {
        let mut found = false;
        self.walk(&mut |f| {
            found |= matches!(
                f,
                Self::Next { .. } | Self::Always { .. } | Self::Eventually { .. }
            );
        });
        found
    }

    /// Selectors and style properties this formula reads
    #[must_use]
    pub fn dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::default();
        deps.collect(self);
        deps
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Formula]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Surface syntax rendering, used for diagnostics
impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool { value } => write!(f, "{value}"),
            Self::Number { value } => write!(f, "{value}"),
            Self::String { value } => write!(f, "{value:?}"),
            Self::Var { name } => write!(f, "{name}"),
            Self::Not { formula } => write!(f, "not {formula}"),
            Self::And { left, right } => write!(f, "({left} and {right})"),
            Self::Or { left, right } => write!(f, "({left} or {right})"),
            Self::Implies { left, right } => write!(f, "({left} => {right})"),
            Self::Equals { left, right } => write!(f, "({left} == {right})"),
            Self::Compare { cmp, left, right } => write!(f, "({left} {} {right})", cmp.symbol()),
            Self::Forall { var, domain, body } => write!(f, "(forall {var} in {domain}: {body})"),
            Self::Exists { var, domain, body } => write!(f, "(exists {var} in {domain}: {body})"),
            Self::Next { formula } => write!(f, "next({formula})"),
            Self::Always { formula } => write!(f, "always({formula})"),
            Self::Eventually { formula } => write!(f, "eventually({formula})"),
            Self::Query { selector } => write!(f, "query({:?})", selector.as_str()),
            Self::Text { element } => write!(f, "{element}.text"),
            Self::Attribute { element, name } => write!(f, "{element}.attributes({name:?})"),
            Self::Style { element, name } => write!(f, "{element}.style({name:?})"),
            Self::Visible { element } => write!(f, "{element}.visible"),
            Self::Set { items } => {
                write!(f, "{{")?;
                write_list(f, items)?;
                write!(f, "}}")
            }
            Self::Sequence { items } => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Self::Filter {
                var,
                domain,
                predicate,
            } => write!(f, "{{{var} in {domain}: {predicate}}}"),
            Self::Map { var, domain, body } => write!(f, "{{{body} for {var} in {domain}}}"),
            Self::Length { formula } => write!(f, "length({formula})"),
            Self::Matches { formula, pattern } => write!(f, "matches({formula}, {pattern:?})"),
            Self::Call { operator, args } => {
                if args.is_empty() {
                    write!(f, "{operator}")
                } else {
                    write!(f, "{operator}(")?;
                    write_list(f, args)?;
                    write!(f, ")")
                }
            }
            Self::Helper { name } => write!(f, "helper({name})"),
            Self::Happened => write!(f, "happened"),
        }
    }
}

/// A named, non-recursive formula fragment: `name(params) = body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    /// Operator name
    pub name: String,
    /// Parameter names, bound positionally
    #[serde(default)]
    pub params: Vec<String>,
    /// Body
    pub body: Formula,
}

impl OperatorDef {
    /// Define an operator
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
        body: Formula,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            body,
        }
    }

    /// Zero-argument operator (a named constant)
    #[must_use]
    pub fn constant(name: impl Into<String>, body: Formula) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            body,
        }
    }

    /// Operators called directly from the body
    #[must_use]
    pub fn callees(&self) -> BTreeSet<&str> {
        let mut callees = BTreeSet::new();
        self.body.walk(&mut |f| {
            if let Formula::Call { operator, .. } = f {
                callees.insert(operator.as_str());
            }
        });
        callees
    }
}

impl fmt::Display for OperatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{} = {}", self.name, self.body)
        } else {
            write!(f, "{}({}) = {}", self.name, self.params.join(", "), self.body)
        }
    }
}

/// What the executor has to capture for a formula to be decidable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Selectors to run in every state
    pub selectors: BTreeSet<Selector>,
    /// Computed style properties to read from every captured element
    pub styles: BTreeSet<String>,
}

impl Dependencies {
    /// Add everything `formula` reads
    pub fn collect(&mut self, formula: &Formula) {
        formula.walk(&mut |f| match f {
            Formula::Query { selector } => {
                self.selectors.insert(selector.clone());
            }
            Formula::Style { name, .. } => {
                self.styles.insert(name.clone());
            }
            _ => {}
        });
    }

    /// Merge another dependency set
    pub fn extend(&mut self, other: Self) {
        self.selectors.extend(other.selectors);
        self.styles.extend(other.styles);
    }

    /// Whether nothing needs capturing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty() && self.styles.is_empty()
    }
}
