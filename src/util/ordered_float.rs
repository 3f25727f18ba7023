use num_traits::Float;
use std::cmp::Ordering;

/// A float with a total order, used as a key in priority queues.
///
/// Only constructible from non-NaN values, which makes `Ord` sound.
#[derive(Debug, Copy, Clone)]
pub struct OrderedFloat<F: Float>(F);

impl<F: Float> OrderedFloat<F> {
    /// Returns `None` for NaN.
    pub fn new(value: F) -> Option<Self> {
        if value.is_nan() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn value(&self) -> F {
        self.0
    }
}

impl<F: Float> PartialEq for OrderedFloat<F> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<F: Float> Eq for OrderedFloat<F> {}

impl<F: Float> PartialOrd for OrderedFloat<F> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<F: Float> Ord for OrderedFloat<F> {
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN is excluded at construction.
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}
