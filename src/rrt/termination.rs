use std::time::{Duration, Instant};

/// Decides when a planner should stop.
///
/// Planners poll `evaluate` once per outer iteration, so implementations must be cheap.
/// Any `FnMut() -> bool` closure is a termination condition.
pub trait TerminationCondition {
    /// Returns true if the planner should terminate.
    fn evaluate(&mut self) -> bool;
}

impl<F: FnMut() -> bool> TerminationCondition for F {
    fn evaluate(&mut self) -> bool {
        self()
    }
}

/// Terminates after a fixed number of evaluations.
#[derive(Clone, Debug)]
pub struct MaxIterationsTermination {
    max_iterations: usize,
    iterations: usize,
}

impl MaxIterationsTermination {
    /// Constructs a termination condition that allows `max_iterations` iterations.
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            iterations: 0,
        }
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl TerminationCondition for MaxIterationsTermination {
    fn evaluate(&mut self) -> bool {
        if self.iterations >= self.max_iterations {
            return true;
        }
        self.iterations += 1;
        false
    }
}

/// Terminates once a wall-clock budget is spent.
/// The clock starts at construction.
#[derive(Clone, Debug)]
pub struct MaxTimeTermination {
    start: Instant,
    max_duration: Duration,
}

impl MaxTimeTermination {
    pub fn new(max_duration: Duration) -> Self {
        Self {
            start: Instant::now(),
            max_duration,
        }
    }

    /// Restarts the clock.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl TerminationCondition for MaxTimeTermination {
    fn evaluate(&mut self) -> bool {
        self.start.elapsed() >= self.max_duration
    }
}

/// Terminates as soon as either of two conditions does.
/// Both conditions are evaluated on every call so iteration counters stay in step.
pub struct AnyTermination<A, B> {
    first: A,
    second: B,
}

impl<A: TerminationCondition, B: TerminationCondition> AnyTermination<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: TerminationCondition, B: TerminationCondition> TerminationCondition
    for AnyTermination<A, B>
{
    fn evaluate(&mut self) -> bool {
        let first = self.first.evaluate();
        let second = self.second.evaluate();
        first || second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_iterations_allows_exactly_n_iterations() {
        let mut termination = MaxIterationsTermination::new(3);
        let allowed = std::iter::from_fn(|| Some(termination.evaluate()))
            .take_while(|done| !done)
            .count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn zero_duration_terminates_immediately() {
        let mut termination = MaxTimeTermination::new(Duration::ZERO);
        assert!(termination.evaluate());
    }

    #[test]
    fn closures_are_termination_conditions() {
        let mut calls = 0;
        let mut termination = || {
            calls += 1;
            calls > 2
        };
        assert!(!termination.evaluate());
        assert!(!termination.evaluate());
        assert!(termination.evaluate());
    }

    #[test]
    fn any_termination_stops_on_either() {
        let mut termination = AnyTermination::new(
            MaxIterationsTermination::new(5),
            MaxIterationsTermination::new(2),
        );
        assert!(!termination.evaluate());
        assert!(!termination.evaluate());
        assert!(termination.evaluate());
    }
}
