//! Formula evaluation over a finite behavior.
//!
//! The evaluator is pure: it reads states that the executor already
//! captured and never talks to a browser. Temporal modalities are bounded
//! folds over the remaining positions of the behavior, so `always(p)` means
//! "for the rest of this run", never "forever".
//!
//! Operator arguments are passed by name: each parameter is bound to the
//! argument formula together with the caller's environment, and is evaluated
//! at the position where the body references it. The body itself runs in a
//! fresh environment holding only its parameters.

use crate::formula::Formula;
use crate::result::EvalError;
use crate::spec::ValidatedSpec;
use crate::state::{Behavior, State};
use crate::value::{ElementRef, Value};
use std::collections::BTreeSet;
use std::rc::Rc;

enum Binding<'f> {
    /// Quantifier or comprehension variable
    Value(Value),
    /// Operator parameter, evaluated where it is referenced
    Thunk { formula: &'f Formula, env: Env<'f> },
}

struct Frame<'f> {
    name: &'f str,
    binding: Binding<'f>,
    parent: Env<'f>,
}

type Env<'f> = Option<Rc<Frame<'f>>>;

fn extend<'f>(env: &Env<'f>, name: &'f str, binding: Binding<'f>) -> Env<'f> {
    Some(Rc::new(Frame {
        name,
        binding,
        parent: env.clone(),
    }))
}

fn lookup<'e, 'f>(env: &'e Env<'f>, name: &str) -> Option<&'e Binding<'f>> {
    let mut current = env.as_ref();
    while let Some(frame) = current {
        if frame.name == name {
            return Some(&frame.binding);
        }
        current = frame.parent.as_ref();
    }
    None
}

fn type_mismatch(expected: &str, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn to_bool(value: &Value) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| type_mismatch("bool", value))
}

fn to_element(value: &Value) -> Result<&ElementRef, EvalError> {
    value.as_element().ok_or_else(|| type_mismatch("element", value))
}

/// Container shape, used to rebuild comprehension results
#[derive(Clone, Copy)]
enum Shape {
    Set,
    Sequence,
}

fn items(value: Value) -> Result<(Shape, Vec<Value>), EvalError> {
    match value {
        Value::Set(items) => Ok((Shape::Set, items.into_iter().collect())),
        Value::Sequence(items) => Ok((Shape::Sequence, items)),
        other => Err(type_mismatch("set or sequence", &other)),
    }
}

fn rebuild(shape: Shape, items: Vec<Value>) -> Value {
    match shape {
        Shape::Set => Value::Set(items.into_iter().collect::<BTreeSet<_>>()),
        Shape::Sequence => Value::Sequence(items),
    }
}

/// Evaluates formulas of one validated specification
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    spec: &'a ValidatedSpec,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator
    #[must_use]
    pub const fn new(spec: &'a ValidatedSpec) -> Self {
        Self { spec }
    }

    /// Evaluate `formula` with `position` as "now"
    pub fn evaluate(
        &self,
        formula: &Formula,
        behavior: &Behavior,
        position: usize,
    ) -> Result<Value, EvalError> {
        if position >= behavior.len() {
            return Err(EvalError::PositionOutOfRange {
                position,
                len: behavior.len(),
            });
        }
        self.eval(formula, &None, behavior, position)
    }

    /// Evaluate the proposition at the start of `behavior`
    pub fn verdict(&self, behavior: &Behavior) -> Result<bool, EvalError> {
        let value = self.evaluate(self.spec.proposition(), behavior, 0)?;
        to_bool(&value)
    }

    fn state<'b>(behavior: &'b Behavior, position: usize) -> Result<&'b State, EvalError> {
        behavior
            .get(position)
            .ok_or_else(|| EvalError::PositionOutOfRange {
                position,
                len: behavior.len(),
            })
    }

    fn eval_bool<'f>(
        &self,
        formula: &'f Formula,
        env: &Env<'f>,
        behavior: &Behavior,
        position: usize,
    ) -> Result<bool, EvalError>
    where
        'a: 'f,
    {
        let value = self.eval(formula, env, behavior, position)?;
        to_bool(&value)
    }

    fn eval<'f>(
        &self,
        formula: &'f Formula,
        env: &Env<'f>,
        behavior: &Behavior,
        position: usize,
    ) -> Result<Value, EvalError>
    where
        'a: 'f,
    {
        match formula {
            Formula::Bool { value } => Ok(Value::Bool(*value)),
            Formula::Number { value } => Ok(Value::Number(*value)),
            Formula::String { value } => Ok(Value::String(value.clone())),
            Formula::Var { name } => match lookup(env, name) {
                Some(Binding::Value(value)) => Ok(value.clone()),
                Some(Binding::Thunk {
                    formula: arg,
                    env: arg_env,
                }) => self.eval(arg, arg_env, behavior, position),
                None => Err(EvalError::TypeMismatch {
                    expected: "bound variable".to_string(),
                    found: name.clone(),
                }),
            },
            Formula::Not { formula: inner } => {
                Ok(Value::Bool(!self.eval_bool(inner, env, behavior, position)?))
            }
            Formula::And { left, right } => {
                let result = self.eval_bool(left, env, behavior, position)?
                    && self.eval_bool(right, env, behavior, position)?;
                Ok(Value::Bool(result))
            }
            Formula::Or { left, right } => {
                let result = self.eval_bool(left, env, behavior, position)?
                    || self.eval_bool(right, env, behavior, position)?;
                Ok(Value::Bool(result))
            }
            Formula::Implies { left, right } => {
                let result = !self.eval_bool(left, env, behavior, position)?
                    || self.eval_bool(right, env, behavior, position)?;
                Ok(Value::Bool(result))
            }
            Formula::Equals { left, right } => {
                let l = self.eval(left, env, behavior, position)?;
                let r = self.eval(right, env, behavior, position)?;
                Ok(Value::Bool(l == r))
            }
            Formula::Compare { cmp, left, right } => {
                let l = self.eval(left, env, behavior, position)?;
                let r = self.eval(right, env, behavior, position)?;
                let ordering = match (&l, &r) {
                    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => return Err(type_mismatch("two numbers or two strings", &r)),
                };
                // NaN compares false either way
                Ok(Value::Bool(ordering.is_some_and(|o| cmp.holds(o))))
            }
            Formula::Forall { var, domain, body } => {
                let (_, values) = items(self.eval(domain, env, behavior, position)?)?;
                for value in values {
                    let inner = extend(env, var, Binding::Value(value));
                    if !self.eval_bool(body, &inner, behavior, position)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Formula::Exists { var, domain, body } => {
                let (_, values) = items(self.eval(domain, env, behavior, position)?)?;
                for value in values {
                    let inner = extend(env, var, Binding::Value(value));
                    if self.eval_bool(body, &inner, behavior, position)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Formula::Next { formula: inner } => {
                if position + 1 >= behavior.len() {
                    return Err(EvalError::NoNextState { position });
                }
                self.eval(inner, env, behavior, position + 1)
            }
            Formula::Always { formula: inner } => {
                for j in position..behavior.len() {
                    if !self.eval_bool(inner, env, behavior, j)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Formula::Eventually { formula: inner } => {
                for j in position..behavior.len() {
                    if self.eval_bool(inner, env, behavior, j)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Formula::Query { selector } => {
                let state = Self::state(behavior, position)?;
                let matches = state.query(selector).ok_or_else(|| EvalError::Uncaptured {
                    selector: selector.to_string(),
                    position,
                })?;
                Ok(Value::sequence(matches.iter().cloned().map(Value::Element)))
            }
            Formula::Text { element }
            | Formula::Attribute { element, .. }
            | Formula::Style { element, .. }
            | Formula::Visible { element } => {
                let value = self.eval(element, env, behavior, position)?;
                let element = to_element(&value)?;
                let state = Self::state(behavior, position)?;
                let snapshot = state
                    .element(element)
                    .ok_or_else(|| EvalError::StaleElement {
                        element: element.clone(),
                        position,
                    })?;
                Ok(match formula {
                    Formula::Text { .. } => Value::String(snapshot.text.clone()),
                    Formula::Attribute { name, .. } => {
                        Value::string(snapshot.attribute(name).unwrap_or_default())
                    }
                    Formula::Style { name, .. } => {
                        Value::String(snapshot.style.get(name).cloned().unwrap_or_default())
                    }
                    _ => Value::Bool(snapshot.visible),
                })
            }
            Formula::Set { items: elements } => {
                let values = elements
                    .iter()
                    .map(|f| self.eval(f, env, behavior, position))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(Value::Set(values))
            }
            Formula::Sequence { items: elements } => {
                let values = elements
                    .iter()
                    .map(|f| self.eval(f, env, behavior, position))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Sequence(values))
            }
            Formula::Filter {
                var,
                domain,
                predicate,
            } => {
                let (shape, values) = items(self.eval(domain, env, behavior, position)?)?;
                let mut kept = Vec::with_capacity(values.len());
                for value in values {
                    let inner = extend(env, var, Binding::Value(value.clone()));
                    if self.eval_bool(predicate, &inner, behavior, position)? {
                        kept.push(value);
                    }
                }
                Ok(rebuild(shape, kept))
            }
            Formula::Map { var, domain, body } => {
                let (shape, values) = items(self.eval(domain, env, behavior, position)?)?;
                let mapped = values
                    .into_iter()
                    .map(|value| {
                        let inner = extend(env, var, Binding::Value(value));
                        self.eval(body, &inner, behavior, position)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rebuild(shape, mapped))
            }
            Formula::Length { formula: inner } => {
                let value = self.eval(inner, env, behavior, position)?;
                #[allow(clippy::cast_precision_loss)]
                let length = match &value {
                    Value::Set(items) => items.len() as f64,
                    Value::Sequence(items) => items.len() as f64,
                    Value::String(s) => s.chars().count() as f64,
                    other => return Err(type_mismatch("set, sequence or string", other)),
                };
                Ok(Value::Number(length))
            }
            Formula::Matches {
                formula: inner,
                pattern,
            } => {
                let value = self.eval(inner, env, behavior, position)?;
                let text = value
                    .as_str()
                    .ok_or_else(|| type_mismatch("string", &value))?;
                let regex = self
                    .spec
                    .pattern(pattern)
                    .ok_or_else(|| EvalError::TypeMismatch {
                        expected: "compiled pattern".to_string(),
                        found: pattern.clone(),
                    })?;
                Ok(Value::Bool(regex.is_match(text)))
            }
            Formula::Call { operator, args } => {
                let def = self
                    .spec
                    .operator(operator)
                    .ok_or_else(|| EvalError::TypeMismatch {
                        expected: "defined operator".to_string(),
                        found: operator.clone(),
                    })?;
                let mut body_env = None;
                for (param, arg) in def.params.iter().zip(args) {
                    body_env = extend(
                        &body_env,
                        param,
                        Binding::Thunk {
                            formula: arg,
                            env: env.clone(),
                        },
                    );
                }
                self.eval(&def.body, &body_env, behavior, position)
            }
            Formula::Helper { name } => {
                let helper = self
                    .spec
                    .helper(name)
                    .ok_or_else(|| EvalError::TypeMismatch {
                        expected: "defined helper".to_string(),
                        found: name.clone(),
                    })?;
                let state = Self::state(behavior, position)?;
                helper
                    .check(state)
                    .map(Value::Bool)
                    .map_err(|source| EvalError::Query { position, source })
            }
            Formula::Happened => {
                let state = Self::state(behavior, position)?;
                Ok(Value::string(state.happened()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::assertion::Assertion;
    use crate::formula::{Comparison, OperatorDef};
    use crate::query::{Expect, Query, QueryAssertion};
    use crate::spec::Specification;
    use crate::state::ElementSnapshot;

    fn validated(spec: Specification) -> ValidatedSpec {
        spec.validate().unwrap()
    }

    fn plain() -> ValidatedSpec {
        validated(Specification::new("#app", Formula::truth()))
    }

    /// States where `.flag` is visible according to `pattern`
    fn flags(pattern: &[bool]) -> Behavior {
        let states = pattern
            .iter()
            .enumerate()
            .map(|(i, visible)| {
                State::new(if i == 0 { "loaded" } else { "click" }).with_element(
                    ".flag",
                    ElementRef::new("f"),
                    ElementSnapshot::new("div", format!("step {i}")).with_visible(*visible),
                )
            })
            .collect();
        Behavior::from_states(states).unwrap()
    }

    fn flag_visible() -> Formula {
        Formula::exists(
            "f",
            Formula::query(".flag"),
            Formula::visible(Formula::var("f")),
        )
    }

    fn eval(
        spec: &ValidatedSpec,
        formula: &Formula,
        behavior: &Behavior,
        position: usize,
    ) -> Value {
        Evaluator::new(spec)
            .evaluate(formula, behavior, position)
            .unwrap()
    }

    mod connective_tests {
        use super::*;

        #[test]
        fn test_and_short_circuits() {
            // The right operand would fail with NoNextState
            let f = Formula::and(Formula::falsity(), Formula::next(Formula::truth()));
            let spec = plain();
            assert_eq!(eval(&spec, &f, &flags(&[true]), 0), Value::Bool(false));
        }

        #[test]
        fn test_or_and_implies() {
            let spec = plain();
            let b = flags(&[true]);
            let or = Formula::or(Formula::truth(), Formula::next(Formula::truth()));
            assert_eq!(eval(&spec, &or, &b, 0), Value::Bool(true));
            let implies = Formula::implies(Formula::falsity(), Formula::falsity());
            assert_eq!(eval(&spec, &implies, &b, 0), Value::Bool(true));
        }

        #[test]
        fn test_equals_across_kinds_is_false() {
            let f = Formula::equals(Formula::string("1"), Formula::number(1.0));
            assert_eq!(eval(&plain(), &f, &flags(&[true]), 0), Value::Bool(false));
        }

        #[test]
        fn test_compare() {
            let spec = plain();
            let b = flags(&[true]);
            let lt = Formula::compare(Comparison::Lt, Formula::string("a"), Formula::string("b"));
            assert_eq!(eval(&spec, &lt, &b, 0), Value::Bool(true));
            let nan = Formula::compare(
                Comparison::Ge,
                Formula::number(f64::NAN),
                Formula::number(1.0),
            );
            assert_eq!(eval(&spec, &nan, &b, 0), Value::Bool(false));
        }
    }

    mod temporal_tests {
        use super::*;

        #[test]
        fn test_always_false_at_last_position() {
            let f = Formula::always(flag_visible());
            let spec = plain();
            assert_eq!(eval(&spec, &f, &flags(&[true, true, false]), 0), Value::Bool(false));
            assert_eq!(eval(&spec, &f, &flags(&[true, true, true]), 0), Value::Bool(true));
            assert_eq!(eval(&spec, &f, &flags(&[false, true]), 1), Value::Bool(true));
        }

        #[test]
        fn test_eventually() {
            let f = Formula::eventually(flag_visible());
            let spec = plain();
            assert_eq!(eval(&spec, &f, &flags(&[false, false, true]), 0), Value::Bool(true));
            assert_eq!(eval(&spec, &f, &flags(&[true, false]), 1), Value::Bool(false));
        }

        #[test]
        fn test_next_at_last_position_fails() {
            let spec = plain();
            let err = Evaluator::new(&spec)
                .evaluate(&Formula::next(flag_visible()), &flags(&[true, false]), 1)
                .unwrap_err();
            assert_eq!(err, EvalError::NoNextState { position: 1 });
        }

        #[test]
        fn test_next_reads_following_state() {
            let spec = plain();
            let f = Formula::next(flag_visible());
            assert_eq!(eval(&spec, &f, &flags(&[true, false]), 0), Value::Bool(false));
        }

        #[test]
        fn test_position_out_of_range() {
            let spec = plain();
            let err = Evaluator::new(&spec)
                .evaluate(&Formula::truth(), &flags(&[true]), 1)
                .unwrap_err();
            assert!(matches!(err, EvalError::PositionOutOfRange { .. }));
        }

        #[test]
        fn test_happened_labels() {
            let spec = plain();
            let b = flags(&[true, true]);
            assert_eq!(eval(&spec, &Formula::Happened, &b, 0), Value::from("loaded"));
            assert_eq!(eval(&spec, &Formula::Happened, &b, 1), Value::from("click"));
        }
    }

    mod quantifier_tests {
        use super::*;

        #[test]
        fn test_empty_domains() {
            let spec = plain();
            let b = flags(&[true]);
            let forall = Formula::forall("x", Formula::set([]), Formula::falsity());
            let exists = Formula::exists("x", Formula::set([]), Formula::truth());
            assert_eq!(eval(&spec, &forall, &b, 0), Value::Bool(true));
            assert_eq!(eval(&spec, &exists, &b, 0), Value::Bool(false));
        }

        #[test]
        fn test_quantifier_body_with_next_uses_same_binding() {
            let f = Formula::forall(
                "f",
                Formula::query(".flag"),
                Formula::next(Formula::visible(Formula::var("f"))),
            );
            let spec = plain();
            assert_eq!(eval(&spec, &f, &flags(&[true, true]), 0), Value::Bool(true));
            assert_eq!(eval(&spec, &f, &flags(&[true, false]), 0), Value::Bool(false));
        }

        #[test]
        fn test_stale_element() {
            let first = State::loaded().with_element(
                "li",
                ElementRef::new("gone"),
                ElementSnapshot::new("li", "x"),
            );
            let second = State::new("click").with_empty("li");
            let behavior = Behavior::from_states(vec![first, second]).unwrap();
            let f = Formula::forall(
                "e",
                Formula::query("li"),
                Formula::next(Formula::visible(Formula::var("e"))),
            );
            let spec = plain();
            let err = Evaluator::new(&spec).evaluate(&f, &behavior, 0).unwrap_err();
            assert_eq!(
                err,
                EvalError::StaleElement {
                    element: ElementRef::new("gone"),
                    position: 1
                }
            );
        }

        #[test]
        fn test_uncaptured_selector() {
            let spec = plain();
            let err = Evaluator::new(&spec)
                .evaluate(&Formula::query("#other"), &flags(&[true]), 0)
                .unwrap_err();
            assert!(matches!(err, EvalError::Uncaptured { .. }));
        }
    }

    mod comprehension_tests {
        use super::*;

        fn list() -> Behavior {
            let state = ["b", "a", "b"]
                .iter()
                .enumerate()
                .fold(State::loaded(), |state, (i, text)| {
                    state.with_element(
                        "li",
                        ElementRef::new(format!("l{i}")),
                        ElementSnapshot::new("li", *text),
                    )
                });
            Behavior::new(state)
        }

        #[test]
        fn test_map_preserves_sequence_order() {
            let f = Formula::map("e", Formula::query("li"), Formula::text(Formula::var("e")));
            assert_eq!(
                eval(&plain(), &f, &list(), 0),
                Value::sequence(["b", "a", "b"].map(Value::from))
            );
        }

        #[test]
        fn test_map_over_set_deduplicates() {
            let f = Formula::map(
                "t",
                Formula::set([Formula::string("b"), Formula::string("a")]),
                Formula::length(Formula::var("t")),
            );
            assert_eq!(
                eval(&plain(), &f, &list(), 0),
                Value::set([Value::Number(1.0)])
            );
        }

        #[test]
        fn test_filter_keeps_container_kind() {
            let texts = Formula::map("e", Formula::query("li"), Formula::text(Formula::var("e")));
            let f = Formula::filter(
                "t",
                texts,
                Formula::equals(Formula::var("t"), Formula::string("b")),
            );
            assert_eq!(
                eval(&plain(), &f, &list(), 0),
                Value::sequence(["b", "b"].map(Value::from))
            );
            let set = Formula::filter(
                "n",
                Formula::set([Formula::number(1.0), Formula::number(2.0)]),
                Formula::compare(Comparison::Gt, Formula::var("n"), Formula::number(1.0)),
            );
            assert_eq!(
                eval(&plain(), &set, &list(), 0),
                Value::set([Value::Number(2.0)])
            );
        }

        #[test]
        fn test_length_and_matches() {
            let spec = validated(Specification::new(
                "#app",
                Formula::matches(Formula::string("click-3"), r"^click-\d$"),
            ));
            let b = list();
            assert_eq!(
                eval(&spec, &Formula::length(Formula::query("li")), &b, 0),
                Value::Number(3.0)
            );
            assert!(Evaluator::new(&spec).verdict(&b).unwrap());
        }
    }

    mod operator_tests {
        use super::*;

        #[test]
        fn test_zero_argument_operator_is_constant() {
            let spec = validated(
                Specification::new("#app", Formula::constant("shown"))
                    .with_operator(OperatorDef::constant("shown", flag_visible())),
            );
            let evaluator = Evaluator::new(&spec);
            assert!(evaluator.verdict(&flags(&[true])).unwrap());
            assert!(!evaluator.verdict(&flags(&[false])).unwrap());
        }

        #[test]
        fn test_argument_evaluated_at_reference_position() {
            // later(p) = next(p); later(flag_visible) reads the next state
            let spec = validated(
                Specification::new("#app", Formula::call("later", [flag_visible()])).with_operator(
                    OperatorDef::new("later", ["p"], Formula::next(Formula::var("p"))),
                ),
            );
            let evaluator = Evaluator::new(&spec);
            assert!(!evaluator.verdict(&flags(&[true, false])).unwrap());
            assert!(evaluator.verdict(&flags(&[false, true])).unwrap());
        }

        #[test]
        fn test_substitution_is_capture_avoiding() {
            // shadow(p) = exists x in {1}: p, called with the caller's x = "outer"
            let spec = validated(
                Specification::new(
                    "#app",
                    Formula::forall(
                        "x",
                        Formula::set([Formula::string("outer")]),
                        Formula::call(
                            "shadow",
                            [Formula::equals(Formula::var("x"), Formula::string("outer"))],
                        ),
                    ),
                )
                .with_operator(OperatorDef::new(
                    "shadow",
                    ["p"],
                    Formula::exists("x", Formula::set([Formula::number(1.0)]), Formula::var("p")),
                )),
            );
            assert!(Evaluator::new(&spec).verdict(&flags(&[true])).unwrap());
        }
    }

    mod helper_tests {
        use super::*;

        fn spec_with(expect: Expect) -> ValidatedSpec {
            let helper = QueryAssertion::new(
                Query::text(".flag"),
                Assertion::contains("step"),
                expect,
            )
            .unwrap();
            validated(
                Specification::new("#app", Formula::always(Formula::helper("flag_text")))
                    .with_helper("flag_text", helper),
            )
        }

        #[test]
        fn test_helper_decides_each_state() {
            let spec = spec_with(Expect::One);
            assert!(Evaluator::new(&spec).verdict(&flags(&[true, false])).unwrap());
        }

        #[test]
        fn test_helper_query_error_is_eval_error() {
            let spec = spec_with(Expect::One);
            let behavior = Behavior::new(State::loaded().with_empty(".flag"));
            let err = Evaluator::new(&spec).verdict(&behavior).unwrap_err();
            assert!(matches!(err, EvalError::Query { position: 0, .. }));
        }
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let spec = plain();
        let f = Formula::always(Formula::implies(
            flag_visible(),
            Formula::eventually(Formula::not(flag_visible())),
        ));
        let b = flags(&[true, false, true, true]);
        let first = eval(&spec, &f, &b, 0);
        for _ in 0..5 {
            assert_eq!(eval(&spec, &f, &b, 0), first);
        }
    }
}
