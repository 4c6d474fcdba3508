//! map_cell.rs — Per-cell evidence accumulator
//!
//! A cell is a value type: every mutation returns a new cell. Echo and label
//! evidence are bounded running weights in [−1, +1], updated by exponential
//! smoothing toward ±1 with a decay time constant:
//!
//! `w ← w·γ + s·(1−γ)`, `γ = exp(−Δt/τ)`, `s ∈ {+1, −1}`
//!
//! Δt is measured from the cell's own last evidence time, so re-applying the
//! same signal at the same timestamp is a no-op after the first application.
//!
//! State predicates:
//! - unknown ⇔ no echo evidence and no contact
//! - anechoic ⇔ echo weight < 0, echogenic ⇔ echo weight > 0

use serde::{Deserialize, Serialize};

use wheelly_types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapCell {
    /// Cell centre, immutable.
    pub location: Point,
    /// Time of the last echo-affecting update, ms. 0 = never.
    pub echo_time: u64,
    /// Echo evidence in [−1, +1]: negative anechoic, positive echogenic.
    pub echo_weight: f64,
    /// Time of the last contact, ms. 0 = never.
    pub contact_time: u64,
    /// Time of the last label evidence, ms. 0 = never.
    pub labeled_time: u64,
    /// Label evidence in [−1, +1].
    pub labeled_weight: f64,
}

fn blend(weight: f64, target: f64, dt_ms: u64, decay_ms: f64) -> f64 {
    let gamma = (-(dt_ms as f64) / decay_ms).exp();
    (weight * gamma + target * (1.0 - gamma)).clamp(-1.0, 1.0)
}

impl MapCell {
    pub fn unknown(location: Point) -> Self {
        Self {
            location,
            echo_time: 0,
            echo_weight: 0.0,
            contact_time: 0,
            labeled_time: 0,
            labeled_weight: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.echo_time == 0 && self.contact_time == 0
    }

    pub fn is_anechoic(&self) -> bool {
        self.echo_weight < 0.0
    }

    pub fn is_echogenic(&self) -> bool {
        self.echo_weight > 0.0
    }

    pub fn has_contact(&self) -> bool {
        self.contact_time > 0
    }

    pub fn is_labeled(&self) -> bool {
        self.labeled_weight > 0.0
    }

    /// Known-empty: sensed, no echo, no contact.
    pub fn is_empty(&self) -> bool {
        self.is_anechoic() && !self.has_contact()
    }

    /// An obstacle signal: echo or contact evidence.
    pub fn is_hindrance(&self) -> bool {
        self.is_echogenic() || self.has_contact()
    }

    pub fn add_echogenic(self, timestamp: u64, decay_ms: f64) -> Self {
        let dt = timestamp.saturating_sub(self.echo_time);
        Self {
            echo_time: timestamp,
            echo_weight: blend(self.echo_weight, 1.0, dt, decay_ms),
            ..self
        }
    }

    pub fn add_anechoic(self, timestamp: u64, decay_ms: f64) -> Self {
        let dt = timestamp.saturating_sub(self.echo_time);
        Self {
            echo_time: timestamp,
            echo_weight: blend(self.echo_weight, -1.0, dt, decay_ms),
            ..self
        }
    }

    pub fn with_contact(self, timestamp: u64) -> Self {
        Self {
            contact_time: timestamp,
            ..self
        }
    }

    pub fn add_labeled(self, timestamp: u64, decay_ms: f64) -> Self {
        let dt = timestamp.saturating_sub(self.labeled_time);
        Self {
            labeled_time: timestamp,
            labeled_weight: blend(self.labeled_weight, 1.0, dt, decay_ms),
            ..self
        }
    }

    pub fn add_unlabeled(self, timestamp: u64, decay_ms: f64) -> Self {
        let dt = timestamp.saturating_sub(self.labeled_time);
        Self {
            labeled_time: timestamp,
            labeled_weight: blend(self.labeled_weight, -1.0, dt, decay_ms),
            ..self
        }
    }

    /// Erase evidence whose last update predates the given deadlines.
    pub fn clean(self, echo_deadline: u64, contact_deadline: u64, labeled_deadline: u64) -> Self {
        let mut cell = self;
        if cell.echo_time > 0 && cell.echo_time < echo_deadline {
            cell.echo_time = 0;
            cell.echo_weight = 0.0;
        }
        if cell.contact_time > 0 && cell.contact_time < contact_deadline {
            cell.contact_time = 0;
        }
        if cell.labeled_time > 0 && cell.labeled_time < labeled_deadline {
            cell.labeled_time = 0;
            cell.labeled_weight = 0.0;
        }
        cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAU: f64 = 1000.0;

    fn cell() -> MapCell {
        MapCell::unknown(Point::zero())
    }

    #[test]
    fn fresh_cell_is_unknown() {
        let c = cell();
        assert!(c.is_unknown());
        assert!(!c.is_anechoic() && !c.is_echogenic());
    }

    #[test]
    fn first_evidence_sets_the_sign() {
        let c = cell().add_echogenic(10_000, TAU);
        assert!(c.is_echogenic());
        assert!(!c.is_unknown());
        let c = cell().add_anechoic(10_000, TAU);
        assert!(c.is_anechoic());
    }

    #[test]
    fn weight_stays_bounded_under_any_sequence() {
        let mut c = cell();
        let mut t: u64 = 1;
        for i in 0u64..1000 {
            c = if i % 3 == 0 {
                c.add_anechoic(t, TAU)
            } else {
                c.add_echogenic(t, TAU)
            };
            t += (i % 7) * 100;
            assert!(
                (-1.0..=1.0).contains(&c.echo_weight),
                "weight {} out of range",
                c.echo_weight
            );
        }
    }

    #[test]
    fn same_timestamp_update_is_idempotent_beyond_first() {
        let once = cell().add_echogenic(5_000, TAU);
        let twice = once.add_echogenic(5_000, TAU);
        assert_eq!(once, twice);
    }

    #[test]
    fn opposite_evidence_pulls_weight_back() {
        let c = cell().add_echogenic(1_000, TAU);
        let w0 = c.echo_weight;
        let c = c.add_anechoic(2_000, TAU);
        assert!(c.echo_weight < w0);
    }

    #[test]
    fn contact_does_not_touch_echo_evidence() {
        let c = cell().add_anechoic(1_000, TAU).with_contact(2_000);
        assert!(c.has_contact());
        assert!(c.is_anechoic());
        assert!(c.is_hindrance());
        assert!(!c.is_empty());
    }

    #[test]
    fn clean_erases_only_expired_evidence() {
        let c = cell()
            .add_echogenic(1_000, TAU)
            .with_contact(5_000)
            .add_labeled(1_000, TAU);
        let cleaned = c.clean(2_000, 2_000, 2_000);
        assert_eq!(cleaned.echo_time, 0);
        assert_eq!(cleaned.echo_weight, 0.0);
        assert_eq!(cleaned.labeled_time, 0);
        assert_eq!(cleaned.labeled_weight, 0.0);
        assert_eq!(cleaned.contact_time, 5_000);

        let untouched = c.clean(500, 500, 500);
        assert_eq!(untouched, c);
    }

    #[test]
    fn label_erasure_keeps_the_invariant() {
        let c = cell().add_labeled(1_000, TAU).clean(0, 0, 2_000);
        assert_eq!(c.labeled_weight, 0.0);
        assert_eq!(c.labeled_time, 0);
    }
}
