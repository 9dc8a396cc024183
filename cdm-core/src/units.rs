//! Linear unit conversion table.
//!
//! Conversions are `value * factor`. A pair is converted directly when a
//! factor is registered, otherwise through the SI pivot of the source unit's
//! family when both hops are registered.

use std::collections::HashMap;

use crate::error::ConversionWarning;
use crate::validation::ValidationResult;
use crate::vocab::Unit;

/// Registered conversion factors keyed by `(from, to)`.
#[derive(Debug, Clone)]
pub struct UnitTable {
    factors: HashMap<(Unit, Unit), f64>,
}

impl Default for UnitTable {
    fn default() -> Self {
        Self::seeded()
    }
}

impl UnitTable {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            factors: HashMap::new(),
        }
    }

    /// Table with the built-in factors.
    pub fn seeded() -> Self {
        let mut table = Self::empty();
        table.register_pair(Unit::Foot, Unit::Meter, 0.3048);
        table.register_pair(Unit::Kilometer, Unit::Meter, 1000.0);
        table.register_pair(Unit::NauticalMile, Unit::Meter, 1852.0);
        table.register_pair(Unit::Degree, Unit::Radian, std::f64::consts::PI / 180.0);
        table.register_pair(Unit::Knot, Unit::MeterPerSecond, 1852.0 / 3600.0);
        table.register_pair(Unit::Millisecond, Unit::Second, 1e-3);
        table.register_pair(Unit::Microsecond, Unit::Second, 1e-6);
        table
    }

    /// Register a single directed factor.
    pub fn register(&mut self, from: Unit, to: Unit, factor: f64) {
        self.factors.insert((from, to), factor);
    }

    /// Register `from -> to` and its reciprocal.
    pub fn register_pair(&mut self, from: Unit, to: Unit, factor: f64) {
        self.register(from, to, factor);
        self.register(to, from, 1.0 / factor);
    }

    /// Direct factor for a pair, without pivoting.
    pub fn factor(&self, from: Unit, to: Unit) -> Option<f64> {
        self.factors.get(&(from, to)).copied()
    }

    /// Number of directed factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// All registered factors, sorted by unit names.
    pub fn entries(&self) -> Vec<(Unit, Unit, f64)> {
        let mut entries: Vec<_> = self
            .factors
            .iter()
            .map(|(&(from, to), &factor)| (from, to, factor))
            .collect();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries
    }

    /// Convert when a path exists.
    pub fn try_convert(&self, value: f64, from: Unit, to: Unit) -> Option<f64> {
        if from == to {
            return Some(value);
        }
        if let Some(factor) = self.factor(from, to) {
            return Some(value * factor);
        }

        let pivot = from.family().pivot();
        if pivot == from || pivot == to {
            return None;
        }
        let to_pivot = self.factor(from, pivot)?;
        let from_pivot = self.factor(pivot, to)?;
        Some(value * to_pivot * from_pivot)
    }

    /// Convert, degrading to the input value with one warning when no path
    /// exists.
    pub fn convert(&self, value: f64, from: Unit, to: Unit, report: &mut ValidationResult) -> f64 {
        match self.try_convert(value, from, to) {
            Some(converted) => converted,
            None => {
                let warning = ConversionWarning::UnitPathMissing { from, to };
                tracing::warn!("{}", warning);
                report.add_warning(warning);
                value
            }
        }
    }
}
