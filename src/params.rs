//! Backend selection and sampling parameters.
//!
//! Each backend carries its own defaults. Explicit overrides win over the
//! defaults, and anything neither side sets is left out of the payload.

use std::fmt;
use std::ops::RangeInclusive;

use serde::Serialize;

use crate::error::AskError;

/// Remote model family. Exactly one is active per invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Claude,
    Grok,
    Gemini,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Claude, Backend::Grok, Backend::Gemini];

    /// Pick the backend from the CLI flags. No flag selects Claude; more
    /// than one is a configuration error.
    pub fn from_flags(claude: bool, grok: bool, gemini: bool) -> Result<Self, AskError> {
        let flags = [
            (claude, Backend::Claude),
            (grok, Backend::Grok),
            (gemini, Backend::Gemini),
        ];
        let selected: Vec<Backend> = flags
            .into_iter()
            .filter_map(|(on, backend)| on.then_some(backend))
            .collect();

        match selected.as_slice() {
            [] => Ok(Backend::default()),
            [one] => Ok(*one),
            many => {
                let names: Vec<String> = many.iter().map(|b| format!("--{}", b.flag())).collect();
                Err(AskError::Configuration(format!(
                    "backend flags are mutually exclusive, got {}",
                    names.join(" and ")
                )))
            }
        }
    }

    /// OpenRouter model identifier sent in the request body.
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Claude => "anthropic/claude-3.5-sonnet:beta",
            Self::Grok => "x-ai/grok-beta",
            Self::Gemini => "google/gemini-pro-1.5",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Grok => "Grok",
            Self::Gemini => "Gemini",
        }
    }

    fn flag(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Grok => "grok",
            Self::Gemini => "gemini",
        }
    }

    pub fn defaults(&self) -> ModelParameters {
        let base = ModelParameters {
            temperature: Some(0.5),
            top_p: Some(1.0),
            top_k: Some(0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
            repetition_penalty: Some(1.0),
            min_p: Some(0.0),
            top_a: Some(0.0),
        };
        match self {
            Self::Claude => base,
            Self::Grok => ModelParameters {
                temperature: Some(0.8),
                ..base
            },
            Self::Gemini => ModelParameters {
                temperature: Some(0.7),
                top_p: Some(0.95),
                top_k: Some(40),
                ..ModelParameters::default()
            },
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

pub const UNIT_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const PENALTY_RANGE: RangeInclusive<f64> = 0.0..=2.0;

/// Sampling controls forwarded to the endpoint. `None` fields are omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModelParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_a: Option<f64>,
}

impl ModelParameters {
    /// Merge `overrides` over the backend defaults and validate the result.
    pub fn resolve(backend: Backend, overrides: &ModelParameters) -> Result<Self, AskError> {
        overrides.validate()?;
        let defaults = backend.defaults();
        let resolved = ModelParameters {
            temperature: overrides.temperature.or(defaults.temperature),
            top_p: overrides.top_p.or(defaults.top_p),
            top_k: overrides.top_k.or(defaults.top_k),
            frequency_penalty: overrides.frequency_penalty.or(defaults.frequency_penalty),
            presence_penalty: overrides.presence_penalty.or(defaults.presence_penalty),
            repetition_penalty: overrides.repetition_penalty.or(defaults.repetition_penalty),
            min_p: overrides.min_p.or(defaults.min_p),
            top_a: overrides.top_a.or(defaults.top_a),
        };
        resolved.validate()?;
        tracing::debug!(%backend, params = ?resolved, "resolved model parameters");
        Ok(resolved)
    }

    /// Reject any set value that is non-finite or outside its documented range.
    pub fn validate(&self) -> Result<(), AskError> {
        check("temperature", self.temperature, UNIT_RANGE)?;
        check("top_p", self.top_p, UNIT_RANGE)?;
        check("frequency_penalty", self.frequency_penalty, PENALTY_RANGE)?;
        check("presence_penalty", self.presence_penalty, PENALTY_RANGE)?;
        check("repetition_penalty", self.repetition_penalty, PENALTY_RANGE)?;
        check("min_p", self.min_p, UNIT_RANGE)?;
        check("top_a", self.top_a, UNIT_RANGE)?;
        Ok(())
    }

    /// `(name, value, valid range)` rows for display. `top_k` has no upper
    /// bound and reports `None` as its range.
    pub fn rows(&self) -> Vec<(&'static str, Option<String>, Option<RangeInclusive<f64>>)> {
        let f = |v: Option<f64>| v.map(|v| format!("{v:.2}"));
        vec![
            ("temperature", f(self.temperature), Some(UNIT_RANGE)),
            ("top_p", f(self.top_p), Some(UNIT_RANGE)),
            ("top_k", self.top_k.map(|k| k.to_string()), None),
            ("frequency_penalty", f(self.frequency_penalty), Some(PENALTY_RANGE)),
            ("presence_penalty", f(self.presence_penalty), Some(PENALTY_RANGE)),
            ("repetition_penalty", f(self.repetition_penalty), Some(PENALTY_RANGE)),
            ("min_p", f(self.min_p), Some(UNIT_RANGE)),
            ("top_a", f(self.top_a), Some(UNIT_RANGE)),
        ]
    }
}

fn check(field: &str, value: Option<f64>, range: RangeInclusive<f64>) -> Result<(), AskError> {
    if let Some(v) = value
        && (!v.is_finite() || !range.contains(&v))
    {
        return Err(AskError::validation(
            field,
            format!(
                "must be between {:.1} and {:.1}, got {v}",
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flag_selects_claude() {
        assert_eq!(Backend::from_flags(false, false, false).unwrap(), Backend::Claude);
    }

    #[test]
    fn single_flag_selects_that_backend() {
        assert_eq!(Backend::from_flags(false, true, false).unwrap(), Backend::Grok);
        assert_eq!(Backend::from_flags(false, false, true).unwrap(), Backend::Gemini);
        assert_eq!(Backend::from_flags(true, false, false).unwrap(), Backend::Claude);
    }

    #[test]
    fn two_flags_is_configuration_error() {
        let err = Backend::from_flags(true, true, false).unwrap_err();
        assert!(matches!(err, AskError::Configuration(_)));
        assert!(err.to_string().contains("--claude and --grok"), "{err}");

        let err = Backend::from_flags(false, true, true).unwrap_err();
        assert!(matches!(err, AskError::Configuration(_)));
    }

    #[test]
    fn overrides_beat_defaults() {
        let overrides = ModelParameters {
            temperature: Some(0.1),
            ..Default::default()
        };
        let p = ModelParameters::resolve(Backend::Grok, &overrides).unwrap();
        assert_eq!(p.temperature, Some(0.1));
        assert_eq!(p.top_p, Some(1.0));
    }

    #[test]
    fn backend_defaults_apply_when_unset() {
        let claude = ModelParameters::resolve(Backend::Claude, &Default::default()).unwrap();
        let grok = ModelParameters::resolve(Backend::Grok, &Default::default()).unwrap();
        assert_eq!(claude.temperature, Some(0.5));
        assert_eq!(grok.temperature, Some(0.8));
        assert_eq!(grok.repetition_penalty, Some(1.0));
    }

    #[test]
    fn unset_without_default_is_omitted() {
        let p = ModelParameters::resolve(Backend::Gemini, &Default::default()).unwrap();
        assert_eq!(p.frequency_penalty, None);
        let json = serde_json::to_value(p).unwrap();
        assert!(json.get("frequency_penalty").is_none());
        assert_eq!(json["top_k"], 40);
    }

    #[test]
    fn temperature_above_one_is_rejected() {
        let overrides = ModelParameters {
            temperature: Some(1.5),
            ..Default::default()
        };
        let err = ModelParameters::resolve(Backend::Claude, &overrides).unwrap_err();
        match err {
            AskError::Validation { field, .. } => assert_eq!(field, "temperature"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_values_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let overrides = ModelParameters {
                top_p: Some(bad),
                ..Default::default()
            };
            assert!(ModelParameters::resolve(Backend::Claude, &overrides).is_err());
        }
    }

    #[test]
    fn every_range_is_enforced_at_both_ends() {
        type Make = fn(f64) -> ModelParameters;
        let cases: [(&str, RangeInclusive<f64>, Make); 7] = [
            ("temperature", UNIT_RANGE, |v| ModelParameters {
                temperature: Some(v),
                ..Default::default()
            }),
            ("top_p", UNIT_RANGE, |v| ModelParameters {
                top_p: Some(v),
                ..Default::default()
            }),
            ("frequency_penalty", PENALTY_RANGE, |v| ModelParameters {
                frequency_penalty: Some(v),
                ..Default::default()
            }),
            ("presence_penalty", PENALTY_RANGE, |v| ModelParameters {
                presence_penalty: Some(v),
                ..Default::default()
            }),
            ("repetition_penalty", PENALTY_RANGE, |v| ModelParameters {
                repetition_penalty: Some(v),
                ..Default::default()
            }),
            ("min_p", UNIT_RANGE, |v| ModelParameters {
                min_p: Some(v),
                ..Default::default()
            }),
            ("top_a", UNIT_RANGE, |v| ModelParameters {
                top_a: Some(v),
                ..Default::default()
            }),
        ];
        for (name, range, make) in cases {
            let (lo, hi) = (*range.start(), *range.end());
            assert!(make(lo - 0.01).validate().is_err(), "{name} below range accepted");
            assert!(make(lo).validate().is_ok(), "{name} lower bound rejected");
            assert!(make(hi).validate().is_ok(), "{name} upper bound rejected");
            assert!(make(hi + 0.01).validate().is_err(), "{name} above range accepted");
        }
    }

    #[test]
    fn probability_fields_reject_penalty_scale_values() {
        for v in [1.01, 1.5, 2.0] {
            for (name, p) in [
                ("top_p", ModelParameters { top_p: Some(v), ..Default::default() }),
                ("min_p", ModelParameters { min_p: Some(v), ..Default::default() }),
                ("top_a", ModelParameters { top_a: Some(v), ..Default::default() }),
                ("temperature", ModelParameters { temperature: Some(v), ..Default::default() }),
            ] {
                match p.validate() {
                    Err(AskError::Validation { field, .. }) => assert_eq!(field, name),
                    other => panic!("{name}={v} should be rejected, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn resolved_parameters_always_in_range() {
        for backend in Backend::ALL {
            for t in [0.0, 0.25, 1.0] {
                let overrides = ModelParameters {
                    temperature: Some(t),
                    presence_penalty: Some(2.0),
                    ..Default::default()
                };
                let p = ModelParameters::resolve(backend, &overrides).unwrap();
                assert!(p.validate().is_ok());
                assert!(UNIT_RANGE.contains(&p.temperature.unwrap()));
            }
        }
    }
}
