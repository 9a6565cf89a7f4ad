//! Static catalog of harmonic pattern templates
//!
//! Each template lists the expected normalized leg ratios of an XABCD structure in the order
//! `[AB/XA, BC/AB, CD/BC, AD/XA]`.

use crate::PatternKind;

/// Expected leg ratios for one named harmonic pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternTemplate {
    pub kind: PatternKind,
    pub name: &'static str,
    /// `[AB, BC, CD, AD]`
    pub ratios: [f64; 4],
    /// Per-leg absolute tolerance used to report how many legs sit inside the band
    pub tolerance: f64,
}

impl PatternTemplate {
    pub const fn new(kind: PatternKind, name: &'static str, ratios: [f64; 4], tolerance: f64) -> Self {
        Self { kind, name, ratios, tolerance }
    }

    /// Number of observed legs within `tolerance` of the template
    pub fn legs_within_tolerance(&self, legs: &[f64; 4]) -> usize {
        legs.iter()
            .zip(self.ratios.iter())
            .filter(|(actual, expected)| (*actual - *expected).abs() <= self.tolerance)
            .count()
    }

    /// True when D completes beyond X (AD > 1)
    #[inline]
    pub fn extends_beyond_origin(&self) -> bool {
        self.ratios[3] > 1.0
    }
}

const HARMONIC_TOLERANCE: f64 = 0.05;

/// Catalog order is significant: it breaks confidence ties.
pub static STANDARD_TEMPLATES: [PatternTemplate; 4] = [
    PatternTemplate::new(PatternKind::HarmonicGartley, "Gartley", [0.618, 0.382, 1.272, 0.786], HARMONIC_TOLERANCE),
    PatternTemplate::new(PatternKind::HarmonicButterfly, "Butterfly", [0.786, 0.382, 1.618, 1.27], HARMONIC_TOLERANCE),
    PatternTemplate::new(PatternKind::HarmonicBat, "Bat", [0.5, 0.382, 1.618, 0.886], HARMONIC_TOLERANCE),
    PatternTemplate::new(PatternKind::HarmonicCrab, "Crab", [0.618, 0.382, 2.618, 1.618], HARMONIC_TOLERANCE),
];

/// Read-only view over a template table
#[derive(Debug, Clone, Copy)]
pub struct TemplateCatalog {
    templates: &'static [PatternTemplate],
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl TemplateCatalog {
    /// Gartley, Butterfly, Bat, Crab
    pub const fn standard() -> Self {
        Self { templates: &STANDARD_TEMPLATES }
    }

    /// Catalog over a custom static table
    pub const fn from_static(templates: &'static [PatternTemplate]) -> Self {
        Self { templates }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static PatternTemplate> {
        self.templates.iter()
    }

    pub fn for_kind(&self, kind: PatternKind) -> Option<&'static PatternTemplate> {
        self.templates.iter().find(|t| t.kind == kind)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_order() {
        let names: Vec<_> = TemplateCatalog::standard().iter().map(|t| t.name).collect();
        assert_eq!(names, ["Gartley", "Butterfly", "Bat", "Crab"]);
    }

    #[test]
    fn test_every_template_is_harmonic() {
        for t in TemplateCatalog::standard().iter() {
            assert!(t.kind.is_harmonic());
            assert!(t.ratios.iter().all(|r| *r > 0.0));
        }
    }

    #[test]
    fn test_for_kind() {
        let catalog = TemplateCatalog::standard();
        assert_eq!(catalog.for_kind(PatternKind::HarmonicCrab).unwrap().ratios[2], 2.618);
        assert!(catalog.for_kind(PatternKind::GoldenSpiral).is_none());
    }

    #[test]
    fn test_legs_within_tolerance() {
        let gartley = &STANDARD_TEMPLATES[0];
        assert_eq!(gartley.legs_within_tolerance(&[0.618, 0.382, 1.272, 0.786]), 4);
        assert_eq!(gartley.legs_within_tolerance(&[0.618, 0.382, 1.272, 0.682]), 3);
        assert!(!gartley.extends_beyond_origin());
        assert!(STANDARD_TEMPLATES[3].extends_beyond_origin());
    }
}
