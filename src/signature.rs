//! Acceptance rule for indexable declarations.
//!
//! A marked declaration is indexable iff, after dropping positional-only
//! parameters, exactly one remaining parameter is required (no default).
//! Variadic `*args` / `**kwargs` are never required. That parameter is the
//! subject; its annotation is the subject type.

use std::fmt;

use crate::parsing::{ParamKind, RawDeclaration, RawParameter};

/// Why a declaration was not indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rejection {
    /// No marker decorator
    NoMarker,
    /// Marker present but the function takes no parameters
    NoParameters,
    /// Every candidate parameter has a default
    AllDefaults,
    /// Only positional-only / variadic parameters are required
    NoSubject,
    /// Two or more required parameters after the positional-only prefix
    MultipleSubjects,
    /// The subject parameter has no annotation to key on
    MissingAnnotation,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMarker => "no_marker",
            Self::NoParameters => "no_parameters",
            Self::AllDefaults => "all_defaults",
            Self::NoSubject => "no_subject",
            Self::MultipleSubjects => "multiple_subjects",
            Self::MissingAnnotation => "missing_annotation",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The accepted subject of a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject<'a> {
    pub parameter: &'a RawParameter,
    /// Annotation text as written
    pub type_raw: &'a str,
}

/// Apply the acceptance rule.
pub fn validate(decl: &RawDeclaration) -> Result<Subject<'_>, Rejection> {
    if !decl.has_marker {
        return Err(Rejection::NoMarker);
    }
    if decl.parameters.is_empty() {
        return Err(Rejection::NoParameters);
    }

    let candidates: Vec<&RawParameter> = decl
        .parameters
        .iter()
        .filter(|p| !p.positional_only)
        .collect();

    let required: Vec<&RawParameter> = candidates
        .iter()
        .copied()
        .filter(|p| p.kind == ParamKind::Regular && !p.has_default)
        .collect();

    match required.as_slice() {
        [subject] => {
            let parameter = *subject;
            match parameter.annotation.as_deref() {
                Some(type_raw) if !type_raw.trim().is_empty() => Ok(Subject {
                    parameter,
                    type_raw,
                }),
                _ => Err(Rejection::MissingAnnotation),
            }
        }
        [] if candidates.iter().any(|p| p.has_default)
            && candidates.iter().all(|p| p.has_default || p.kind != ParamKind::Regular) =>
        {
            Err(Rejection::AllDefaults)
        }
        [] => Err(Rejection::NoSubject),
        _ => Err(Rejection::MultipleSubjects),
    }
}
