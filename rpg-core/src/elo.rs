pub const DEFAULT_ELO: i64 = 1000;

/// A rating together with the historical extremes it has reached.
///
/// `floor <= rating <= peak` holds for every value produced by [`EloBounds::new`]
/// and [`EloBounds::apply`]. Values read back from storage may violate it, since
/// the table itself does not check it; use [`EloBounds::is_consistent`] for that.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EloBounds {
    pub rating: i64,
    pub peak: i64,
    pub floor: i64,
}

impl EloBounds {
    pub fn new(rating: i64) -> Self {
        Self {
            rating,
            peak: rating,
            floor: rating,
        }
    }

    pub fn apply(&mut self, new_rating: i64) {
        self.rating = new_rating;
        self.peak = self.peak.max(new_rating);
        self.floor = self.floor.min(new_rating);
    }

    pub fn is_consistent(&self) -> bool {
        self.floor <= self.rating && self.rating <= self.peak
    }
}

impl Default for EloBounds {
    fn default() -> Self {
        Self::new(DEFAULT_ELO)
    }
}
