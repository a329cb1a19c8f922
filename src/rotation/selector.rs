//! Endpoint selection.
//!
//! None of these operations fail: an empty enabled set is reported as
//! `None` and callers fall through to the unmodified request.

use std::collections::HashSet;

use rand::Rng;

use super::endpoint::{Endpoint, EndpointId};
use super::state::{RotationMode, RotationState, SwitchPolicy};

impl RotationState {
    /// Enabled endpoints in list order.
    pub fn enabled_endpoints(&self) -> Vec<&Endpoint> {
        self.endpoints.iter().filter(|e| e.enabled).collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.enabled).count()
    }

    /// Endpoint under the cursor. Does not move the cursor.
    pub fn current_endpoint(&self) -> Option<&Endpoint> {
        let enabled = self.enabled_endpoints();
        if enabled.is_empty() {
            return None;
        }
        Some(enabled[self.cursor % enabled.len()])
    }

    /// Move the cursor according to `mode` and return the endpoint under it.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Endpoint> {
        let enabled: Vec<EndpointId> = self.enabled_endpoints().iter().map(|e| e.id).collect();
        let n = enabled.len();

        let index = match n {
            0 => return None,
            1 => 0,
            _ => match self.mode {
                RotationMode::Sequential => (self.cursor % n + 1) % n,
                RotationMode::Random => {
                    let previous = self
                        .last_pick
                        .and_then(|id| enabled.iter().position(|e| *e == id));
                    match previous {
                        // Draw from the other n - 1 slots so the previous pick
                        // can never come back immediately.
                        Some(prev) => {
                            let draw = rng.gen_range(0..n - 1);
                            if draw >= prev {
                                draw + 1
                            } else {
                                draw
                            }
                        }
                        None => rng.gen_range(0..n),
                    }
                }
            },
        };

        self.cursor = index;
        self.last_pick = Some(enabled[index]);
        self.find(&enabled[index]).cloned()
    }

    /// `advance` under per-request switching, `current_endpoint` when sticky.
    pub fn select_for_dispatch<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Endpoint> {
        match self.switch_policy {
            SwitchPolicy::PerRequest => self.advance(rng),
            SwitchPolicy::StickyUntilError => self.current_endpoint().cloned(),
        }
    }

    /// Advance until an endpoint outside `tried` comes up.
    ///
    /// Gives up on the rotation order after `n` advances and takes the first
    /// untried enabled endpoint in list order instead, moving the cursor onto
    /// it. Returns `None` once every enabled endpoint has been tried.
    pub fn advance_untried<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        tried: &HashSet<EndpointId>,
    ) -> Option<Endpoint> {
        let n = self.enabled_count();
        for _ in 0..n {
            match self.advance(rng) {
                Some(endpoint) if !tried.contains(&endpoint.id) => return Some(endpoint),
                Some(_) => continue,
                None => return None,
            }
        }

        let (index, endpoint) = self
            .enabled_endpoints()
            .into_iter()
            .enumerate()
            .find(|(_, e)| !tried.contains(&e.id))
            .map(|(i, e)| (i, e.clone()))?;
        self.cursor = index;
        self.last_pick = Some(endpoint.id);
        Some(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::endpoint::EndpointDraft;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn state_with(names: &[&str]) -> RotationState {
        let mut state = RotationState::default();
        for name in names {
            state.endpoints.push(
                Endpoint::from_draft(EndpointDraft::new(*name, format!("https://{}.example.com", name)))
                    .unwrap(),
            );
        }
        state
    }

    #[test]
    fn test_sequential_cycles_in_list_order() {
        let mut state = state_with(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(1);
        let picks: Vec<String> = (0..6)
            .map(|_| state.advance(&mut rng).unwrap().name)
            .collect();
        assert_eq!(picks, vec!["b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_advance_empty_leaves_cursor() {
        let mut state = state_with(&[]);
        state.cursor = 7;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(state.advance(&mut rng).is_none());
        assert_eq!(state.cursor, 7);
    }

    #[test]
    fn test_single_endpoint_resets_cursor() {
        let mut state = state_with(&["only"]);
        state.cursor = 5;
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..3 {
            assert_eq!(state.advance(&mut rng).unwrap().name, "only");
            assert_eq!(state.cursor, 0);
        }
    }

    #[test]
    fn test_random_never_repeats() {
        let mut state = state_with(&["a", "b"]);
        state.mode = RotationMode::Random;
        let mut rng = StdRng::seed_from_u64(42);
        let mut previous = state.advance(&mut rng).unwrap().id;
        for _ in 0..200 {
            let next = state.advance(&mut rng).unwrap().id;
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[test]
    fn test_current_skips_disabled() {
        let mut state = state_with(&["a", "b", "c"]);
        state.cursor = 2;
        state.endpoints[2].enabled = false;
        // cursor 2 mod 2 enabled => "a"
        assert_eq!(state.current_endpoint().unwrap().name, "a");
    }

    #[test]
    fn test_sticky_does_not_move() {
        let mut state = state_with(&["a", "b"]);
        state.switch_policy = SwitchPolicy::StickyUntilError;
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..3 {
            assert_eq!(state.select_for_dispatch(&mut rng).unwrap().name, "a");
        }
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn test_advance_untried_falls_back_to_list_order() {
        let mut state = state_with(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(9);
        let tried: HashSet<EndpointId> =
            [state.endpoints[1].id, state.endpoints[2].id].into_iter().collect();
        let next = state.advance_untried(&mut rng, &tried).unwrap();
        assert_eq!(next.name, "a");
        assert_eq!(state.cursor, 0);

        let all: HashSet<EndpointId> = state.endpoints.iter().map(|e| e.id).collect();
        assert!(state.advance_untried(&mut rng, &all).is_none());
    }
}
