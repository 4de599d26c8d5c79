//! Property-based tests for evaluation, shrinking and generation

#![allow(clippy::unwrap_used, clippy::expect_used)]

use conducta::{
    is_valid, ActionGenerator, ActionTemplate, Behavior, Comparison, ElementRef, ElementSnapshot,
    Evaluator, Formula, Seed, ShrinkSearch, Specification, State, ValidatedSpec, Value,
};
use proptest::prelude::*;

// ===== Fixtures =====

fn plain_spec() -> ValidatedSpec {
    Specification::new(".flag", Formula::truth()).validate().unwrap()
}

/// One state per flag; the `.flag` element is visible iff the flag is set
fn flag_behavior(flags: &[bool]) -> Behavior {
    let states = flags
        .iter()
        .enumerate()
        .map(|(i, &flag)| {
            let happened = if i == 0 { "loaded" } else { "click" };
            State::new(happened).with_element(
                ".flag",
                ElementRef::new("flag"),
                ElementSnapshot::new("div", "flag").with_visible(flag),
            )
        })
        .collect();
    Behavior::from_states(states).unwrap()
}

/// `exists f in query(".flag"): visible(f)`
fn flag_up() -> Formula {
    Formula::exists(
        "f",
        Formula::query(".flag"),
        Formula::visible(Formula::var("f")),
    )
}

fn numbers(items: &[i32]) -> Formula {
    Formula::sequence(items.iter().map(|&n| Formula::number(f64::from(n))))
}

fn below(bound: i32) -> Formula {
    Formula::compare(
        Comparison::Lt,
        Formula::var("x"),
        Formula::number(f64::from(bound)),
    )
}

fn eval(formula: &Formula, behavior: &Behavior, position: usize) -> Value {
    Evaluator::new(&plain_spec())
        .evaluate(formula, behavior, position)
        .unwrap()
}

// ===== Strategies =====

fn flags_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..24)
}

fn small_ints() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-50i32..50, 0..16)
}

/// A sequence of distinct items plus a non-empty subset that must survive shrinking
fn shrink_case() -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
    (1usize..40).prop_flat_map(|len| {
        let items: Vec<u32> = (0..len as u32).collect();
        let needles = prop::sample::subsequence(items.clone(), 1..=len.min(4));
        (Just(items), needles)
    })
}

// ===== Temporal laws =====

proptest! {
    /// Evaluation is a pure function of formula, behavior and position
    #[test]
    fn prop_evaluation_is_deterministic(flags in flags_strategy()) {
        let behavior = flag_behavior(&flags);
        let formula = Formula::always(Formula::implies(
            flag_up(),
            Formula::eventually(Formula::not(flag_up())),
        ));
        let first = Evaluator::new(&plain_spec()).evaluate(&formula, &behavior, 0);
        let second = Evaluator::new(&plain_spec()).evaluate(&formula, &behavior, 0);
        prop_assert_eq!(first, second);
    }

    /// `always p` holds iff `p` holds in every state from now on
    #[test]
    fn prop_always_is_conjunction(flags in flags_strategy(), start in 0usize..24) {
        let behavior = flag_behavior(&flags);
        let start = start % flags.len();
        let expected = flags[start..].iter().all(|&f| f);
        prop_assert_eq!(
            eval(&Formula::always(flag_up()), &behavior, start),
            Value::Bool(expected)
        );
    }

    /// `eventually p` is `not always not p`
    #[test]
    fn prop_eventually_is_dual_of_always(flags in flags_strategy()) {
        let behavior = flag_behavior(&flags);
        let eventually = eval(&Formula::eventually(flag_up()), &behavior, 0);
        let dual = eval(
            &Formula::not(Formula::always(Formula::not(flag_up()))),
            &behavior,
            0,
        );
        prop_assert_eq!(eventually.clone(), dual);
        prop_assert_eq!(eventually, Value::Bool(flags.contains(&true)));
    }

    /// `next p` at i is `p` at i + 1, and undefined in the last state
    #[test]
    fn prop_next_shifts_by_one(flags in flags_strategy()) {
        let behavior = flag_behavior(&flags);
        let spec = plain_spec();
        let evaluator = Evaluator::new(&spec);
        let next = Formula::next(flag_up());
        for i in 0..flags.len() - 1 {
            prop_assert_eq!(
                evaluator.evaluate(&next, &behavior, i).unwrap(),
                evaluator.evaluate(&flag_up(), &behavior, i + 1).unwrap()
            );
        }
        prop_assert!(evaluator.evaluate(&next, &behavior, flags.len() - 1).is_err());
    }
}

// ===== Quantifier laws =====

proptest! {
    /// `forall` agrees with `Iterator::all`, `exists` with `Iterator::any`
    #[test]
    fn prop_quantifiers_match_iterators(items in small_ints(), bound in -50i32..50) {
        let behavior = flag_behavior(&[true]);
        let forall = Formula::forall("x", numbers(&items), below(bound));
        let exists = Formula::exists("x", numbers(&items), below(bound));
        prop_assert_eq!(
            eval(&forall, &behavior, 0),
            Value::Bool(items.iter().all(|&n| n < bound))
        );
        prop_assert_eq!(
            eval(&exists, &behavior, 0),
            Value::Bool(items.iter().any(|&n| n < bound))
        );
    }

    /// `forall x: p` is `not exists x: not p`
    #[test]
    fn prop_forall_is_dual_of_exists(items in small_ints(), bound in -50i32..50) {
        let behavior = flag_behavior(&[false]);
        let forall = Formula::forall("x", numbers(&items), below(bound));
        let dual = Formula::not(Formula::exists(
            "x",
            numbers(&items),
            Formula::not(below(bound)),
        ));
        prop_assert_eq!(eval(&forall, &behavior, 0), eval(&dual, &behavior, 0));
    }
}

// ===== Shrinking =====

proptest! {
    /// Shrinking keeps every needed item, in order, and drops everything else
    #[test]
    fn prop_shrink_finds_exact_needles((items, needles) in shrink_case()) {
        let rejects = |candidate: &[u32]| needles.iter().all(|n| candidate.contains(n));
        let mut search = ShrinkSearch::new(items);
        let mut trials = 0;
        while let Some(candidate) = search.next_candidate() {
            trials += 1;
            prop_assert!(trials < 10_000, "search did not terminate");
            search.report(rejects(&candidate));
        }
        prop_assert!(search.is_done());
        prop_assert_eq!(search.into_result(), needles);
    }

    /// The result is 1-minimal: removing any single item stops the rejection
    #[test]
    fn prop_shrink_result_is_one_minimal(items in prop::collection::vec(0u8..6, 1..30)) {
        // Rejects while the sum is at least 12
        let rejects = |candidate: &[u8]| candidate.iter().map(|&n| u32::from(n)).sum::<u32>() >= 12;
        prop_assume!(rejects(&items));
        let mut search = ShrinkSearch::new(items);
        while let Some(candidate) = search.next_candidate() {
            search.report(rejects(&candidate));
        }
        let result = search.into_result();
        prop_assert!(rejects(&result));
        for skip in 0..result.len() {
            let without: Vec<u8> = result
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != skip)
                .map(|(_, &n)| n)
                .collect();
            prop_assert!(!rejects(&without));
        }
    }
}

// ===== Generation =====

fn button_state(count: usize) -> State {
    (0..count).fold(State::loaded(), |state, i| {
        state.with_element(
            "button",
            ElementRef::new(format!("b{i}")),
            ElementSnapshot::new("button", format!("#{i}")),
        )
    })
}

proptest! {
    /// Equal seeds draw equal sequences, and every draw is valid
    #[test]
    fn prop_generation_is_deterministic(
        seed in any::<u64>(),
        buttons in 1usize..8,
        draws in 1usize..30,
    ) {
        let state = button_state(buttons);
        let templates = vec![ActionTemplate::click("button")];
        let mut a = ActionGenerator::new(Seed::from_u64(seed));
        let mut b = ActionGenerator::new(Seed::from_u64(seed));
        for _ in 0..draws {
            let left = a.next_action(&state, &templates).unwrap();
            let right = b.next_action(&state, &templates).unwrap();
            prop_assert!(is_valid(&left, &state, &templates));
            prop_assert_eq!(left, right);
        }
    }

    /// Nothing is drawn when no action is valid
    #[test]
    fn prop_no_valid_action_draws_nothing(seed in any::<u64>()) {
        let state = State::loaded().with_empty("button");
        let templates = vec![ActionTemplate::click("button")];
        let mut generator = ActionGenerator::new(Seed::from_u64(seed));
        prop_assert!(generator.next_action(&state, &templates).is_none());
    }
}
