//! Classifier gateway: a narrow capability interface to an external
//! object-class predictor, with label normalization.

use std::fmt;

/// Normalized classification label, the public schema's label universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Wheeled or tracked vehicle.
    Vehicle,
    /// Pedestrian (also covers the `bicycle` training label).
    Person,
    /// Anything else the classifier recognizes (also covers `uav`).
    Others,
    /// Classifier could not produce a label.
    Unknown,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Label::Vehicle => "vehicle",
            Label::Person => "person",
            Label::Others => "others",
            Label::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// The external predictor's raw label universe, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLabel {
    Vehicle,
    Person,
    Bicycle,
    Uav,
}

impl RawLabel {
    /// Normalizes a raw label per §4.E: `uav -> others`, `bicycle -> person`.
    pub fn normalize(self) -> Label {
        match self {
            RawLabel::Vehicle => Label::Vehicle,
            RawLabel::Person => Label::Person,
            RawLabel::Bicycle => Label::Person,
            RawLabel::Uav => Label::Others,
        }
    }
}

/// Classifier error. The gateway never lets this fail the pipeline: on
/// error the caller assigns [`Label::Unknown`] (§4.E, §7).
#[derive(Debug)]
pub struct ClassifyError(pub String);

impl std::error::Error for ClassifyError {}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "classifier error: {}", self.0)
    }
}

/// A narrow capability interface to an external object-class predictor, so
/// swapping in a different model or a remote service never touches the
/// tracker (§9).
pub trait Classifier {
    /// Classifies one detection from its (already smoothed) range,
    /// velocity, and azimuth.
    fn classify(&self, range_m: f32, velocity_m_s: f32, azimuth_deg: f32) -> Result<RawLabel, ClassifyError>;
}

/// Invokes `classifier`, normalizing the result and mapping any failure to
/// [`Label::Unknown`] rather than propagating it.
pub fn classify_gated<C: Classifier>(classifier: &C, range_m: f32, velocity_m_s: f32, azimuth_deg: f32) -> Label {
    match classifier.classify(range_m, velocity_m_s, azimuth_deg) {
        Ok(raw) => raw.normalize(),
        Err(_) => Label::Unknown,
    }
}

/// Reference in-process classifier: a rule-based scorer over
/// range/velocity/signal-strength brackets per class.
///
/// This is a stand-in for the real tree-ensemble model, which is out of
/// scope (§1) — it exists so the pipeline is runnable end to end without a
/// network dependency, and never returns an error.
pub struct RuleBasedClassifier {
    person_range: (f32, f32),
    person_velocity: (f32, f32),
    vehicle_range: (f32, f32),
    vehicle_velocity: (f32, f32),
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        RuleBasedClassifier {
            person_range: (1.0, 100.0),
            person_velocity: (0.5, 2.5),
            vehicle_range: (5.0, 150.0),
            vehicle_velocity: (2.0, 40.0),
        }
    }
}

impl RuleBasedClassifier {
    fn score(range_m: f32, velocity_m_s: f32, range_bracket: (f32, f32), velocity_bracket: (f32, f32)) -> f32 {
        let mut score = 0.0;
        if range_m >= range_bracket.0 && range_m <= range_bracket.1 {
            score += 0.4;
        }
        if velocity_m_s.abs() >= velocity_bracket.0 && velocity_m_s.abs() <= velocity_bracket.1 {
            score += 0.3;
        }
        score
    }
}

impl Classifier for RuleBasedClassifier {
    fn classify(&self, range_m: f32, velocity_m_s: f32, _azimuth_deg: f32) -> Result<RawLabel, ClassifyError> {
        let person_score = Self::score(range_m, velocity_m_s, self.person_range, self.person_velocity);
        let vehicle_score = Self::score(range_m, velocity_m_s, self.vehicle_range, self.vehicle_velocity);

        if vehicle_score >= person_score && vehicle_score > 0.3 {
            Ok(RawLabel::Vehicle)
        } else if person_score > 0.3 {
            Ok(RawLabel::Person)
        } else {
            Ok(RawLabel::Uav)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_uav_and_bicycle() {
        assert_eq!(RawLabel::Uav.normalize(), Label::Others);
        assert_eq!(RawLabel::Bicycle.normalize(), Label::Person);
        assert_eq!(RawLabel::Vehicle.normalize(), Label::Vehicle);
        assert_eq!(RawLabel::Person.normalize(), Label::Person);
    }

    struct FailingClassifier;
    impl Classifier for FailingClassifier {
        fn classify(&self, _: f32, _: f32, _: f32) -> Result<RawLabel, ClassifyError> {
            Err(ClassifyError("unreachable".into()))
        }
    }

    #[test]
    fn gateway_never_fails_pipeline() {
        let label = classify_gated(&FailingClassifier, 50.0, 5.0, 10.0);
        assert_eq!(label, Label::Unknown);
    }

    #[test]
    fn rule_based_classifies_walking_speed_as_person() {
        let c = RuleBasedClassifier::default();
        let label = classify_gated(&c, 20.0, 1.5, 0.0);
        assert_eq!(label, Label::Person);
    }

    #[test]
    fn rule_based_classifies_highway_speed_as_vehicle() {
        let c = RuleBasedClassifier::default();
        let label = classify_gated(&c, 50.0, 20.0, 0.0);
        assert_eq!(label, Label::Vehicle);
    }
}
