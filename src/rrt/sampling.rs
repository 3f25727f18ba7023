//! Sampling and selection policies built on a caller-owned random number generator.
//!
//! The planners never create randomness themselves; these helpers wrap an injected `Rng` into
//! the callbacks the planners expect. Tests substitute seeded generators or plain closures.

use crate::error::{CallbackResult, PlanningError, PlanningResult};
use crate::rrt::birrt::{ActiveTree, SampleType};
use crate::rrt::tree::PlannerTree;
use rand::Rng;

fn validate_ranges<const N: usize>(ranges: &[(f64, f64); N]) -> PlanningResult<()> {
    for (axis, (min, max)) in ranges.iter().enumerate() {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(PlanningError::Configuration(format!(
                "invalid sampling range [{}, {}] on axis {}",
                min, max, axis
            )));
        }
    }
    Ok(())
}

fn validate_probability(name: &str, probability: f64) -> PlanningResult<()> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(PlanningError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, probability
        )));
    }
    Ok(())
}

/// Uniform samples from an axis-aligned box.
pub struct UniformSampler<R: Rng, const N: usize> {
    rng: R,
    ranges: [(f64, f64); N],
}

impl<R: Rng, const N: usize> UniformSampler<R, N> {
    /// Parameters:
    /// - `rng`: The random number generator.
    /// - `ranges`: Inclusive `(min, max)` bounds per axis.
    pub fn new(rng: R, ranges: [(f64, f64); N]) -> PlanningResult<Self> {
        validate_ranges(&ranges)?;
        Ok(Self { rng, ranges })
    }

    pub fn sample(&mut self) -> [f64; N] {
        let mut state = [0.0; N];
        for (value, &(min, max)) in state.iter_mut().zip(self.ranges.iter()) {
            *value = self.rng.gen_range(min..=max);
        }
        state
    }

    /// Converts the sampler into a planner `sampling_fn`.
    pub fn into_sampling_fn(mut self) -> impl FnMut() -> CallbackResult<[f64; N]> {
        move || Ok(self.sample())
    }
}

/// Uniform samples that return the goal with probability `goal_bias`.
pub struct GoalBiasedSampler<R: Rng, const N: usize> {
    uniform: UniformSampler<R, N>,
    goal: [f64; N],
    goal_bias: f64,
}

impl<R: Rng, const N: usize> GoalBiasedSampler<R, N> {
    pub fn new(
        rng: R,
        ranges: [(f64, f64); N],
        goal: [f64; N],
        goal_bias: f64,
    ) -> PlanningResult<Self> {
        validate_probability("goal_bias", goal_bias)?;
        Ok(Self {
            uniform: UniformSampler::new(rng, ranges)?,
            goal,
            goal_bias,
        })
    }

    pub fn sample(&mut self) -> [f64; N] {
        if self.uniform.rng.gen::<f64>() < self.goal_bias {
            self.goal
        } else {
            self.uniform.sample()
        }
    }

    pub fn into_sampling_fn(mut self) -> impl FnMut() -> CallbackResult<[f64; N]> {
        move || Ok(self.sample())
    }
}

/// Keeps extending the same BiRRT tree and switches to the other one with a fixed probability.
pub struct RandomTreeSelection<R: Rng> {
    rng: R,
    switch_probability: f64,
    current: ActiveTree,
}

impl<R: Rng> RandomTreeSelection<R> {
    pub fn new(rng: R, switch_probability: f64) -> PlanningResult<Self> {
        validate_probability("switch_probability", switch_probability)?;
        Ok(Self {
            rng,
            switch_probability,
            current: ActiveTree::Start,
        })
    }

    pub fn select(&mut self) -> ActiveTree {
        if self.rng.gen::<f64>() < self.switch_probability {
            self.current = self.current.other();
        }
        self.current
    }

    /// Converts the policy into a `select_active_tree_fn`.
    pub fn into_select_fn(mut self) -> impl FnMut() -> ActiveTree {
        move || self.select()
    }
}

/// Draws the extension target from the other tree with probability `tree_sampling_bias`.
pub struct RandomSampleTypeSelection<R: Rng> {
    rng: R,
    tree_sampling_bias: f64,
}

impl<R: Rng> RandomSampleTypeSelection<R> {
    pub fn new(rng: R, tree_sampling_bias: f64) -> PlanningResult<Self> {
        validate_probability("tree_sampling_bias", tree_sampling_bias)?;
        Ok(Self {
            rng,
            tree_sampling_bias,
        })
    }

    pub fn select(&mut self) -> SampleType {
        if self.rng.gen::<f64>() < self.tree_sampling_bias {
            SampleType::OtherTree
        } else {
            SampleType::Random
        }
    }

    /// Converts the policy into a `select_sample_type_fn`.
    pub fn into_select_fn(mut self) -> impl FnMut() -> SampleType {
        move || self.select()
    }
}

/// Picks a node of `tree` uniformly at random and returns its state.
pub fn uniform_tree_sample<R: Rng, T: Clone>(rng: &mut R, tree: &PlannerTree<T>) -> T {
    let index = rng.gen_range(0..tree.len());
    tree.nodes()[index].state().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_samples_stay_in_range() {
        let mut sampler =
            UniformSampler::new(StdRng::seed_from_u64(7), [(0.0, 20.0), (-1.0, 1.0)]).unwrap();
        for _ in 0..1000 {
            let [x, y] = sampler.sample();
            assert!((0.0..=20.0).contains(&x));
            assert!((-1.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            UniformSampler::new(StdRng::seed_from_u64(7), [(1.0, 0.0)]),
            Err(PlanningError::Configuration(_))
        ));
    }

    #[test]
    fn full_goal_bias_always_returns_goal() {
        let mut sampler =
            GoalBiasedSampler::new(StdRng::seed_from_u64(1), [(0.0, 10.0)], [4.0], 1.0).unwrap();
        assert!((0..50).all(|_| sampler.sample() == [4.0]));
        assert!(GoalBiasedSampler::new(StdRng::seed_from_u64(1), [(0.0, 10.0)], [4.0], 1.5).is_err());
    }

    #[test]
    fn seeded_policies_are_reproducible() {
        let mut a = RandomTreeSelection::new(StdRng::seed_from_u64(3), 0.5).unwrap();
        let mut b = RandomTreeSelection::new(StdRng::seed_from_u64(3), 0.5).unwrap();
        let first: Vec<ActiveTree> = (0..32).map(|_| a.select()).collect();
        let second: Vec<ActiveTree> = (0..32).map(|_| b.select()).collect();
        assert_eq!(first, second);

        let mut never = RandomSampleTypeSelection::new(StdRng::seed_from_u64(3), 0.0).unwrap();
        assert!((0..32).all(|_| never.select() == SampleType::Random));
    }

    #[test]
    fn tree_samples_come_from_the_tree() {
        let mut tree = PlannerTree::new(0);
        for value in 1..10 {
            tree.add_node(value, value as usize - 1).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            assert!((0..10).contains(&uniform_tree_sample(&mut rng, &tree)));
        }
    }
}
