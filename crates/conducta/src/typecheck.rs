//! Construction-time checks.
//!
//! Everything that can be rejected before a browser is launched is rejected
//! here: operator table errors, recursive operators, `next` over a temporal
//! formula, unbound variables, kind mismatches, assertion kinds, invalid
//! patterns and malformed action templates.
//!
//! Operator calls are checked by checking the operator body in a fresh scope
//! whose parameters carry the kind and temporality of the arguments. This
//! catches `o(p) = next(p)` applied to `always(q)`, and kind errors that only
//! show up for a particular argument.

use crate::formula::{Formula, OperatorDef};
use crate::result::ConstructionError;
use crate::spec::Specification;
use crate::value::ValueKind;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

/// What inference learns about a sub-formula
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Info {
    kind: ValueKind,
    temporal: bool,
}

impl Info {
    const fn plain(kind: ValueKind) -> Self {
        Self {
            kind,
            temporal: false,
        }
    }
}

struct Frame {
    name: String,
    info: Info,
    parent: Scope,
}

type Scope = Option<Rc<Frame>>;

fn bind(scope: &Scope, name: &str, info: Info) -> Scope {
    Some(Rc::new(Frame {
        name: name.to_string(),
        info,
        parent: scope.clone(),
    }))
}

fn lookup(scope: &Scope, name: &str) -> Option<Info> {
    let mut current = scope.as_ref();
    while let Some(frame) = current {
        if frame.name == name {
            return Some(frame.info.clone());
        }
        current = frame.parent.as_ref();
    }
    None
}

/// Result of a successful check
#[derive(Debug)]
pub(crate) struct Checked {
    /// Operators with callees first
    pub order: Vec<String>,
    /// Every pattern used by `matches`, compiled
    pub patterns: BTreeMap<String, Regex>,
}

/// Run every construction check on `spec`
pub(crate) fn check(spec: &Specification) -> Result<Checked, ConstructionError> {
    let operators = operator_table(&spec.operators)?;

    check_calls(&spec.proposition, &operators)?;
    for operator in &spec.operators {
        check_calls(&operator.body, &operators)?;
    }
    let order = topological_order(&operators)?;

    for (name, helper) in &spec.helpers {
        helper.validate().map_err(|e| match e {
            ConstructionError::AssertionKind {
                assertion, kind, ..
            } => ConstructionError::AssertionKind {
                assertion,
                kind,
                selector: format!("{} (helper {name})", helper.query.selector()),
            },
            other => other,
        })?;
    }
    for template in &spec.actions {
        template.validate()?;
    }

    let mut inference = Inference {
        operators: &operators,
        helpers: spec.helpers.keys().map(String::as_str).collect(),
        patterns: BTreeMap::new(),
        calls: HashMap::new(),
    };

    // Standalone check with unconstrained parameters, so unused operators are
    // still checked.
    for name in &order {
        if let Some((&name, &operator)) = operators.get_key_value(name.as_str()) {
            let params = vec![Info::plain(ValueKind::Any); operator.params.len()];
            inference.infer_call(name, operator, params)?;
        }
    }

    let info = inference.infer(&spec.proposition, &None)?;
    expect_kind(&info, &ValueKind::Bool, "bool", &spec.proposition)?;

    Ok(Checked {
        order,
        patterns: inference.patterns,
    })
}

fn operator_table(
    operators: &[OperatorDef],
) -> Result<BTreeMap<&str, &OperatorDef>, ConstructionError> {
    let mut table = BTreeMap::new();
    for operator in operators {
        if table.insert(operator.name.as_str(), operator).is_some() {
            return Err(ConstructionError::DuplicateOperator {
                name: operator.name.clone(),
            });
        }
    }
    Ok(table)
}

fn check_calls(
    formula: &Formula,
    operators: &BTreeMap<&str, &OperatorDef>,
) -> Result<(), ConstructionError> {
    let mut error = None;
    formula.walk(&mut |f| {
        if error.is_some() {
            return;
        }
        if let Formula::Call { operator, args } = f {
            match operators.get(operator.as_str()) {
                None => {
                    error = Some(ConstructionError::UnknownOperator {
                        name: operator.clone(),
                        fragment: f.to_string(),
                    });
                }
                Some(def) if def.params.len() != args.len() => {
                    error = Some(ConstructionError::ArityMismatch {
                        name: operator.clone(),
                        expected: def.params.len(),
                        found: args.len(),
                        fragment: f.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
    });
    error.map_or(Ok(()), Err)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first topological sort of the call graph
fn topological_order(
    operators: &BTreeMap<&str, &OperatorDef>,
) -> Result<Vec<String>, ConstructionError> {
    fn visit<'a>(
        name: &'a str,
        operators: &BTreeMap<&'a str, &'a OperatorDef>,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), ConstructionError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(name.to_string());
                return Err(ConstructionError::RecursiveOperator { cycle });
            }
            None => {}
        }
        let Some(operator) = operators.get(name).copied() else {
            return Ok(());
        };
        marks.insert(name, Mark::Visiting);
        path.push(name);
        for callee in operator.callees() {
            visit(callee, operators, marks, path, order)?;
        }
        path.pop();
        marks.insert(name, Mark::Done);
        order.push(name.to_string());
        Ok(())
    }

    let mut marks = BTreeMap::new();
    let mut order = Vec::new();
    for name in operators.keys() {
        visit(name, operators, &mut marks, &mut Vec::new(), &mut order)?;
    }
    Ok(order)
}

fn expect_kind(
    info: &Info,
    expected: &ValueKind,
    description: &str,
    fragment: &Formula,
) -> Result<ValueKind, ConstructionError> {
    info.kind
        .unify(expected)
        .ok_or_else(|| ConstructionError::KindMismatch {
            expected: description.to_string(),
            found: info.kind.clone(),
            fragment: fragment.to_string(),
        })
}

fn element_of(info: &Info, fragment: &Formula) -> Result<ValueKind, ConstructionError> {
    match &info.kind {
        ValueKind::Set(inner) | ValueKind::Sequence(inner) => Ok((**inner).clone()),
        ValueKind::Any => Ok(ValueKind::Any),
        other => Err(ConstructionError::KindMismatch {
            expected: "set or sequence".to_string(),
            found: other.clone(),
            fragment: fragment.to_string(),
        }),
    }
}

/// Same container shape as `domain`, holding `inner`
fn rebuild(domain: &ValueKind, inner: ValueKind) -> ValueKind {
    match domain {
        ValueKind::Set(_) => ValueKind::set_of(inner),
        ValueKind::Sequence(_) => ValueKind::sequence_of(inner),
        _ => ValueKind::Any,
    }
}

struct Inference<'a> {
    operators: &'a BTreeMap<&'a str, &'a OperatorDef>,
    helpers: BTreeSet<&'a str>,
    patterns: BTreeMap<String, Regex>,
    /// Body results per operator and argument infos; a body depends on nothing else
    calls: HashMap<(&'a str, Vec<Info>), Info>,
}

impl<'a> Inference<'a> {
    fn infer(&mut self, formula: &Formula, scope: &Scope) -> Result<Info, ConstructionError> {
        let bool_kind = ValueKind::Bool;
        match formula {
            Formula::Bool { .. } => Ok(Info::plain(ValueKind::Bool)),
            Formula::Number { .. } => Ok(Info::plain(ValueKind::Number)),
            Formula::String { .. } | Formula::Happened => Ok(Info::plain(ValueKind::String)),
            Formula::Var { name } => {
                lookup(scope, name).ok_or_else(|| ConstructionError::UnboundVariable {
                    name: name.clone(),
                    fragment: formula.to_string(),
                })
            }
            Formula::Not { formula: inner } => {
                let info = self.infer(inner, scope)?;
                expect_kind(&info, &bool_kind, "bool", inner)?;
                Ok(Info {
                    kind: ValueKind::Bool,
                    temporal: info.temporal,
                })
            }
            Formula::And { left, right }
            | Formula::Or { left, right }
            | Formula::Implies { left, right } => {
                let l = self.infer(left, scope)?;
                expect_kind(&l, &bool_kind, "bool", left)?;
                let r = self.infer(right, scope)?;
                expect_kind(&r, &bool_kind, "bool", right)?;
                Ok(Info {
                    kind: ValueKind::Bool,
                    temporal: l.temporal || r.temporal,
                })
            }
            Formula::Equals { left, right } => {
                let l = self.infer(left, scope)?;
                let r = self.infer(right, scope)?;
                Ok(Info {
                    kind: ValueKind::Bool,
                    temporal: l.temporal || r.temporal,
                })
            }
            Formula::Compare { left, right, .. } => {
                let l = self.infer(left, scope)?;
                let r = self.infer(right, scope)?;
                let kind = l.kind.unify(&r.kind).filter(|k| {
                    matches!(k, ValueKind::Number | ValueKind::String | ValueKind::Any)
                });
                if kind.is_none() {
                    return Err(ConstructionError::KindMismatch {
                        expected: "two numbers or two strings".to_string(),
                        found: r.kind,
                        fragment: formula.to_string(),
                    });
                }
                Ok(Info {
                    kind: ValueKind::Bool,
                    temporal: l.temporal || r.temporal,
                })
            }
            Formula::Forall { var, domain, body } | Formula::Exists { var, domain, body } => {
                let d = self.infer(domain, scope)?;
                let element = element_of(&d, domain)?;
                let inner = bind(scope, var, Info::plain(element));
                let b = self.infer(body, &inner)?;
                expect_kind(&b, &bool_kind, "bool", body)?;
                Ok(Info {
                    kind: ValueKind::Bool,
                    temporal: d.temporal || b.temporal,
                })
            }
            Formula::Next { formula: inner } => {
                let info = self.infer(inner, scope)?;
                if info.temporal {
                    return Err(ConstructionError::NestedNext {
                        fragment: formula.to_string(),
                    });
                }
                Ok(Info {
                    kind: info.kind,
                    temporal: true,
                })
            }
            Formula::Always { formula: inner } | Formula::Eventually { formula: inner } => {
                let info = self.infer(inner, scope)?;
                expect_kind(&info, &bool_kind, "bool", inner)?;
                Ok(Info {
                    kind: ValueKind::Bool,
                    temporal: true,
                })
            }
            Formula::Query { .. } => Ok(Info::plain(ValueKind::sequence_of(ValueKind::Element))),
            Formula::Text { element }
            | Formula::Attribute { element, .. }
            | Formula::Style { element, .. }
            | Formula::Visible { element } => {
                let info = self.infer(element, scope)?;
                expect_kind(&info, &ValueKind::Element, "element", element)?;
                let kind = if matches!(formula, Formula::Visible { .. }) {
                    ValueKind::Bool
                } else {
                    ValueKind::String
                };
                Ok(Info {
                    kind,
                    temporal: info.temporal,
                })
            }
            Formula::Set { items } | Formula::Sequence { items } => {
                let mut kind = ValueKind::Any;
                let mut temporal = false;
                for item in items {
                    let info = self.infer(item, scope)?;
                    temporal |= info.temporal;
                    kind = kind
                        .unify(&info.kind)
                        .ok_or_else(|| ConstructionError::KindMismatch {
                            expected: format!("{kind} like the other elements"),
                            found: info.kind.clone(),
                            fragment: formula.to_string(),
                        })?;
                }
                let kind = if matches!(formula, Formula::Set { .. }) {
                    ValueKind::set_of(kind)
                } else {
                    ValueKind::sequence_of(kind)
                };
                Ok(Info { kind, temporal })
            }
            Formula::Filter {
                var,
                domain,
                predicate,
            } => {
                let d = self.infer(domain, scope)?;
                let element = element_of(&d, domain)?;
                let inner = bind(scope, var, Info::plain(element));
                let p = self.infer(predicate, &inner)?;
                expect_kind(&p, &bool_kind, "bool", predicate)?;
                Ok(Info {
                    kind: d.kind,
                    temporal: d.temporal || p.temporal,
                })
            }
            Formula::Map { var, domain, body } => {
                let d = self.infer(domain, scope)?;
                let element = element_of(&d, domain)?;
                let inner = bind(scope, var, Info::plain(element));
                let b = self.infer(body, &inner)?;
                Ok(Info {
                    kind: rebuild(&d.kind, b.kind),
                    temporal: d.temporal || b.temporal,
                })
            }
            Formula::Length { formula: inner } => {
                let info = self.infer(inner, scope)?;
                if !(info.kind.is_container() || info.kind == ValueKind::String) {
                    return Err(ConstructionError::KindMismatch {
                        expected: "set, sequence or string".to_string(),
                        found: info.kind,
                        fragment: formula.to_string(),
                    });
                }
                Ok(Info {
                    kind: ValueKind::Number,
                    temporal: info.temporal,
                })
            }
            Formula::Matches {
                formula: inner,
                pattern,
            } => {
                let info = self.infer(inner, scope)?;
                expect_kind(&info, &ValueKind::String, "string", inner)?;
                if !self.patterns.contains_key(pattern) {
                    let regex =
                        Regex::new(pattern).map_err(|e| ConstructionError::InvalidPattern {
                            pattern: pattern.clone(),
                            message: e.to_string(),
                        })?;
                    self.patterns.insert(pattern.clone(), regex);
                }
                Ok(Info {
                    kind: ValueKind::Bool,
                    temporal: info.temporal,
                })
            }
            Formula::Call { operator, args } => {
                let operators = self.operators;
                let Some((&name, &def)) = operators.get_key_value(operator.as_str()) else {
                    return Err(ConstructionError::UnknownOperator {
                        name: operator.clone(),
                        fragment: formula.to_string(),
                    });
                };
                let mut arg_infos = Vec::with_capacity(args.len());
                for arg in args {
                    arg_infos.push(self.infer(arg, scope)?);
                }
                self.infer_call(name, def, arg_infos)
            }
            Formula::Helper { name } => {
                if self.helpers.contains(name.as_str()) {
                    Ok(Info::plain(ValueKind::Bool))
                } else {
                    Err(ConstructionError::UnknownHelper { name: name.clone() })
                }
            }
        }
    }

    fn infer_call(
        &mut self,
        name: &'a str,
        def: &'a OperatorDef,
        args: Vec<Info>,
    ) -> Result<Info, ConstructionError> {
        let key = (name, args);
        if let Some(info) = self.calls.get(&key) {
            return Ok(info.clone());
        }
        // Fresh scope: the body sees only its parameters
        let mut body_scope = None;
        for (param, info) in def.params.iter().zip(&key.1) {
            body_scope = bind(&body_scope, param, info.clone());
        }
        let info = self.infer(&def.body, &body_scope)?;
        self.calls.insert(key, info.clone());
        Ok(info)
    }
}
