//! DOM-constrained random action generation.
//!
//! The generator draws one action at a time from the actions that are valid
//! in the most recently observed state. It never executes anything itself:
//! callers feed back the state each action produced. With a fixed seed and
//! identical page responses it produces an identical sequence.
//!
//! # Example
//!
//! ```ignore
//! let mut generator = ActionGenerator::new(Seed::from_u64(12345));
//! let actions = generator.generate_sequence(&initial, &templates, 20, |action| {
//!     app.apply(action)
//! });
//! ```

use crate::action::{candidates, Action, ActionTemplate, Candidate};
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic seed for reproducible generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(u64);

impl Seed {
    /// Create a seed from a u64 value
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw seed value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Seed for the `index`-th test of a run seeded with `self`
    #[must_use]
    pub const fn derive(self, index: u64) -> Self {
        // splitmix64 step, so neighbouring tests get unrelated streams
        let mut z = self.0.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self(z ^ (z >> 31))
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Simple xorshift64 PRNG for deterministic generation
#[derive(Debug, Clone)]
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    const fn new(seed: Seed) -> Self {
        // Ensure non-zero state
        let state = if seed.0 == 0 { 1 } else { seed.0 };
        Self { state }
    }

    const fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    const fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.next() % (max - min))
    }
}

/// How an action is drawn from the valid set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every valid action is equally likely
    #[default]
    Uniform,
    /// Draw proportionally to the template weight
    Weighted,
}

/// Random action generator for one check run
#[derive(Debug, Clone)]
pub struct ActionGenerator {
    rng: Xorshift64,
    weighting: Weighting,
    actions_generated: u64,
}

impl ActionGenerator {
    /// Create a new generator with the given seed
    #[must_use]
    pub const fn new(seed: Seed) -> Self {
        Self {
            rng: Xorshift64::new(seed),
            weighting: Weighting::Uniform,
            actions_generated: 0,
        }
    }

    /// Set the weighting scheme
    #[must_use]
    pub const fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Draw one candidate, `None` if there are none
    #[allow(clippy::cast_possible_truncation)]
    pub fn choose<'c>(&mut self, candidates: &'c [Candidate]) -> Option<&'c Action> {
        if candidates.is_empty() {
            return None;
        }
        let index = match self.weighting {
            Weighting::Uniform => self.rng.next_range(0, candidates.len() as u64) as usize,
            Weighting::Weighted => {
                let total: u64 = candidates.iter().map(|c| u64::from(c.weight)).sum();
                let mut roll = self.rng.next_range(0, total);
                candidates
                    .iter()
                    .position(|c| {
                        let weight = u64::from(c.weight);
                        if roll < weight {
                            true
                        } else {
                            roll -= weight;
                            false
                        }
                    })
                    .unwrap_or(candidates.len() - 1)
            }
        };
        self.actions_generated += 1;
        candidates.get(index).map(|c| &c.action)
    }

    /// Draw the next action for `state`, `None` if nothing is valid
    pub fn next_action(&mut self, state: &State, templates: &[ActionTemplate]) -> Option<Action> {
        let valid = candidates(state, templates);
        self.choose(&valid).cloned()
    }

    /// Generate up to `max_len` actions starting from `initial`.
    ///
    /// `observe` reports the state an action produced; returning `None`
    /// stops generation (for instance when the action could not be
    /// performed). Generation also stops when no action is valid.
    pub fn generate_sequence(
        &mut self,
        initial: &State,
        templates: &[ActionTemplate],
        max_len: usize,
        mut observe: impl FnMut(&Action) -> Option<State>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut current = initial.clone();
        while actions.len() < max_len {
            let Some(action) = self.next_action(&current, templates) else {
                break;
            };
            let next = observe(&action);
            actions.push(action);
            match next {
                Some(state) => current = state,
                None => break,
            }
        }
        actions
    }

    /// Get the total number of actions drawn
    #[must_use]
    pub const fn actions_generated(&self) -> u64 {
        self.actions_generated
    }

    /// Reset the generator with a new seed
    pub const fn reset(&mut self, seed: Seed) {
        self.rng = Xorshift64::new(seed);
        self.actions_generated = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::action::{Interaction, TemplateKind};
    use crate::state::ElementSnapshot;
    use crate::value::ElementRef;

    fn buttons(n: usize) -> State {
        (0..n).fold(State::loaded(), |state, i| {
            state.with_element(
                "button",
                ElementRef::new(format!("b{i}")),
                ElementSnapshot::new("button", format!("{i}")),
            )
        })
    }

    mod seed_tests {
        use super::*;

        #[test]
        fn test_seed_from_u64() {
            assert_eq!(Seed::from_u64(12345).value(), 12345);
            assert_eq!(Seed::default().value(), 0);
        }

        #[test]
        fn test_derive_is_stable_and_distinct() {
            let seed = Seed::from_u64(7);
            assert_eq!(seed.derive(3), seed.derive(3));
            assert_ne!(seed.derive(0), seed.derive(1));
        }
    }

    mod xorshift_tests {
        use super::*;

        #[test]
        fn test_xorshift_deterministic() {
            let mut rng1 = Xorshift64::new(Seed::from_u64(42));
            let mut rng2 = Xorshift64::new(Seed::from_u64(42));
            for _ in 0..100 {
                assert_eq!(rng1.next(), rng2.next());
            }
        }

        #[test]
        fn test_xorshift_range() {
            let mut rng = Xorshift64::new(Seed::from_u64(42));
            for _ in 0..1000 {
                assert!((5..15).contains(&rng.next_range(5, 15)));
            }
        }

        #[test]
        fn test_zero_seed_still_moves() {
            let mut rng = Xorshift64::new(Seed::from_u64(0));
            assert_ne!(rng.next(), 0);
        }
    }

    mod generator_tests {
        use super::*;

        #[test]
        fn test_same_seed_same_sequence() {
            let templates = [ActionTemplate::click("button")];
            let run = |seed| {
                ActionGenerator::new(Seed::from_u64(seed)).generate_sequence(
                    &buttons(5),
                    &templates,
                    30,
                    |_| Some(buttons(5)),
                )
            };
            assert_eq!(run(99), run(99));
            assert_eq!(run(99).len(), 30);
        }

        #[test]
        fn test_stops_when_nothing_valid() {
            let templates = [ActionTemplate::click("button")];
            let mut generator = ActionGenerator::new(Seed::from_u64(1));
            let actions = generator.generate_sequence(&buttons(2), &templates, 10, |_| {
                Some(State::new("click").with_empty("button"))
            });
            assert_eq!(actions.len(), 1);
            assert_eq!(generator.actions_generated(), 1);
        }

        #[test]
        fn test_stops_when_observation_fails() {
            let templates = [ActionTemplate::click("button")];
            let actions = ActionGenerator::new(Seed::from_u64(1)).generate_sequence(
                &buttons(2),
                &templates,
                10,
                |_| None,
            );
            assert_eq!(actions.len(), 1);
        }

        #[test]
        fn test_draws_from_current_state() {
            // After the first click only button 0 remains
            let templates = [ActionTemplate::click("button")];
            let actions = ActionGenerator::new(Seed::from_u64(5)).generate_sequence(
                &buttons(4),
                &templates,
                5,
                |_| Some(buttons(1)),
            );
            assert!(actions[1..]
                .iter()
                .all(|a| a == &crate::action::Action::on(Interaction::Click, "button", 0)));
        }

        #[test]
        fn test_weighted_prefers_heavy_templates() {
            let templates = [
                ActionTemplate::click("button"),
                ActionTemplate::page(TemplateKind::Reload).with_weight(1000),
            ];
            let mut generator =
                ActionGenerator::new(Seed::from_u64(3)).with_weighting(Weighting::Weighted);
            let state = buttons(1);
            let reloads = (0..200)
                .filter_map(|_| generator.next_action(&state, &templates))
                .filter(|a| a.interaction == Interaction::Reload)
                .count();
            assert!(reloads > 180, "reloads = {reloads}");
        }

        #[test]
        fn test_uniform_covers_every_candidate() {
            let templates = [ActionTemplate::click("button")];
            let mut generator = ActionGenerator::new(Seed::from_u64(11));
            let state = buttons(3);
            let mut seen = std::collections::BTreeSet::new();
            for _ in 0..200 {
                if let Some(action) = generator.next_action(&state, &templates) {
                    seen.insert(action.target.map(|t| t.index));
                }
            }
            assert_eq!(seen.len(), 3);
        }

        #[test]
        fn test_reset() {
            let templates = [ActionTemplate::click("button")];
            let mut generator = ActionGenerator::new(Seed::from_u64(8));
            let first = generator.next_action(&buttons(9), &templates);
            generator.reset(Seed::from_u64(8));
            assert_eq!(generator.actions_generated(), 0);
            assert_eq!(generator.next_action(&buttons(9), &templates), first);
        }
    }
}
