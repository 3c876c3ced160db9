/// Weighted round-robin selector over an ordered set of tiers.
///
/// Each tier holds a credit counter. A selection picks the eligible tier
/// with the most outstanding credit (ties go to the smaller enumeration
/// index) and spends one credit; once every eligible tier is out of credit,
/// the counters refill from the weights and selection continues within the
/// same call. Over sustained eligibility each tier is therefore served in
/// proportion to its weight. An ineligible tier is skipped without spending
/// its credit, and a tier with positive weight and an eligible occupant is
/// always reached within one refill round.
///
/// Runs on the single-threaded core — no internal synchronization.
#[derive(Debug)]
pub struct WrrSelector {
    weights: Vec<i32>,
    credits: Vec<u32>,
}

/// Zero- and negative-weight tiers still earn one credit per round so they
/// drain slowly instead of starving.
fn credit_for(weight: i32) -> u32 {
    weight.max(1) as u32
}

impl WrrSelector {
    pub fn new(weights: Vec<i32>) -> Self {
        let credits = weights.iter().map(|w| credit_for(*w)).collect();
        Self { weights, credits }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Dry run: the tier index `next` would pick, computed without touching
    /// any scheduling state. Safe to call any number of times between
    /// selections.
    pub fn peek(&self, eligible: impl Fn(usize) -> bool) -> Option<usize> {
        self.pick(&eligible).map(|(index, _)| index)
    }

    /// Select the next tier among those currently eligible, spending one
    /// credit. Returns `None`, mutating nothing, when no tier is
    /// eligible; the caller substitutes its fallback.
    pub fn next(&mut self, eligible: impl Fn(usize) -> bool) -> Option<usize> {
        let (index, refill) = self.pick(&eligible)?;
        if refill {
            for (credit, weight) in self.credits.iter_mut().zip(&self.weights) {
                *credit = credit_for(*weight);
            }
        }
        self.credits[index] -= 1;
        Some(index)
    }

    /// Shared selection logic. Returns the chosen index and whether a refill
    /// must happen first (every eligible tier was out of credit).
    fn pick(&self, eligible: &impl Fn(usize) -> bool) -> Option<(usize, bool)> {
        let mut charged: Option<usize> = None;
        let mut fresh: Option<usize> = None;

        for index in 0..self.weights.len() {
            if !eligible(index) {
                continue;
            }
            if self.credits[index] > 0
                && charged.is_none_or(|best| self.credits[index] > self.credits[best])
            {
                charged = Some(index);
            }
            if fresh.is_none_or(|best| credit_for(self.weights[index]) > credit_for(self.weights[best]))
            {
                fresh = Some(index);
            }
        }

        match charged {
            Some(index) => Some((index, false)),
            None => fresh.map(|index| (index, true)),
        }
    }
}
