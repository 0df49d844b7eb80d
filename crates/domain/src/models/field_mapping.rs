//! Column mapping models for bulk case imports.
//!
//! Clinics upload files with arbitrary column headers, so every import carries
//! a mapping from file headers to canonical case record fields. The mapping is
//! resolved before any row is processed and every defect is reported at once,
//! rather than one complaint per attempt.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A canonical case record field that a file column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    PatientName,
    Species,
    Breed,
    Sex,
    AgeMonths,
    WeightKg,
    DiagnosisDate,
    TumorType,
    TumorSite,
    Microchip,
    Notes,
}

/// Canonical fields that every mapping must cover.
pub const REQUIRED_FIELDS: [CanonicalField; 3] = [
    CanonicalField::Species,
    CanonicalField::Breed,
    CanonicalField::DiagnosisDate,
];

impl CanonicalField {
    /// Convert to the wire name used in mappings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatientName => "patientName",
            Self::Species => "species",
            Self::Breed => "breed",
            Self::Sex => "sex",
            Self::AgeMonths => "ageMonths",
            Self::WeightKg => "weightKg",
            Self::DiagnosisDate => "diagnosisDate",
            Self::TumorType => "tumorType",
            Self::TumorSite => "tumorSite",
            Self::Microchip => "microchip",
            Self::Notes => "notes",
        }
    }

    /// Whether the field must be present in every mapping.
    pub fn is_required(&self) -> bool {
        REQUIRED_FIELDS.contains(self)
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patientName" => Ok(Self::PatientName),
            "species" => Ok(Self::Species),
            "breed" => Ok(Self::Breed),
            "sex" => Ok(Self::Sex),
            "ageMonths" => Ok(Self::AgeMonths),
            "weightKg" => Ok(Self::WeightKg),
            "diagnosisDate" => Ok(Self::DiagnosisDate),
            "tumorType" => Ok(Self::TumorType),
            "tumorSite" => Ok(Self::TumorSite),
            "microchip" => Ok(Self::Microchip),
            "notes" => Ok(Self::Notes),
            _ => Err(format!("Unknown canonical field: {}", s)),
        }
    }
}

/// Column mapping as submitted by the client: file header to canonical field
/// name. Stored verbatim on the job so a failed mapping can be inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    pub fields: HashMap<String, String>,
}

impl FieldMapping {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }
}

/// One defect found while resolving a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingProblem {
    /// A required canonical field has no source column.
    MissingRequired { field: CanonicalField },
    /// A header maps to a name that is not a canonical field.
    UnknownField { header: String, target: String },
    /// Two or more headers map to the same canonical field.
    DuplicateTarget {
        field: CanonicalField,
        headers: Vec<String>,
    },
}

impl std::fmt::Display for MappingProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "required field '{}' is not mapped", field)
            }
            Self::UnknownField { header, target } => {
                write!(f, "column '{}' maps to unknown field '{}'", header, target)
            }
            Self::DuplicateTarget { field, headers } => {
                write!(
                    f,
                    "field '{}' is mapped by multiple columns: {}",
                    field,
                    headers.join(", ")
                )
            }
        }
    }
}

/// A rejected mapping, carrying every defect found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingError {
    pub problems: Vec<MappingProblem>,
}

impl std::fmt::Display for MappingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let details: Vec<String> = self.problems.iter().map(|p| p.to_string()).collect();
        write!(f, "invalid column mapping: {}", details.join("; "))
    }
}

impl std::error::Error for MappingError {}

/// A validated mapping ready for row projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    by_header: HashMap<String, CanonicalField>,
}

impl ResolvedMapping {
    /// Canonical field a file header maps to, if any.
    pub fn field_for(&self, header: &str) -> Option<CanonicalField> {
        self.by_header.get(header).copied()
    }

    /// Number of mapped columns.
    pub fn len(&self) -> usize {
        self.by_header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_header.is_empty()
    }
}

/// Resolve a submitted mapping into a usable one.
///
/// The whole mapping is checked in one pass and the error lists every problem
/// found: unknown target names, required fields without a source column, and
/// canonical fields claimed by more than one column. Nothing is resolved
/// unless everything is valid.
pub fn resolve_mapping(mapping: &FieldMapping) -> Result<ResolvedMapping, MappingError> {
    let mut problems = Vec::new();
    let mut by_header: HashMap<String, CanonicalField> = HashMap::new();
    let mut headers_by_field: HashMap<CanonicalField, Vec<String>> = HashMap::new();

    let mut entries: Vec<(&String, &String)> = mapping.fields.iter().collect();
    // Deterministic problem order regardless of hash iteration.
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (header, target) in entries {
        match CanonicalField::from_str(target) {
            Ok(field) => {
                by_header.insert(header.clone(), field);
                headers_by_field.entry(field).or_default().push(header.clone());
            }
            Err(_) => problems.push(MappingProblem::UnknownField {
                header: header.clone(),
                target: target.clone(),
            }),
        }
    }

    for field in REQUIRED_FIELDS {
        if !headers_by_field.contains_key(&field) {
            problems.push(MappingProblem::MissingRequired { field });
        }
    }

    let mut duplicates: Vec<(CanonicalField, Vec<String>)> = headers_by_field
        .into_iter()
        .filter(|(_, headers)| headers.len() > 1)
        .collect();
    duplicates.sort_by_key(|(field, _)| field.as_str());
    for (field, headers) in duplicates {
        problems.push(MappingProblem::DuplicateTarget { field, headers });
    }

    if problems.is_empty() {
        Ok(ResolvedMapping { by_header })
    } else {
        Err(MappingError { problems })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping_of(pairs: &[(&str, &str)]) -> FieldMapping {
        FieldMapping::new(
            pairs
                .iter()
                .map(|(h, t)| (h.to_string(), t.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_canonical_field_round_trip() {
        for field in [
            CanonicalField::PatientName,
            CanonicalField::Species,
            CanonicalField::Breed,
            CanonicalField::Sex,
            CanonicalField::AgeMonths,
            CanonicalField::WeightKg,
            CanonicalField::DiagnosisDate,
            CanonicalField::TumorType,
            CanonicalField::TumorSite,
            CanonicalField::Microchip,
            CanonicalField::Notes,
        ] {
            assert_eq!(CanonicalField::from_str(field.as_str()).unwrap(), field);
        }
        assert!(CanonicalField::from_str("ownerPhone").is_err());
        assert!(CanonicalField::from_str("SPECIES").is_err());
    }

    #[test]
    fn test_required_fields() {
        assert!(CanonicalField::Species.is_required());
        assert!(CanonicalField::Breed.is_required());
        assert!(CanonicalField::DiagnosisDate.is_required());
        assert!(!CanonicalField::PatientName.is_required());
        assert!(!CanonicalField::Microchip.is_required());
    }

    #[test]
    fn test_resolve_valid_mapping() {
        let mapping = mapping_of(&[
            ("Pet Name", "patientName"),
            ("Kind", "species"),
            ("Breed", "breed"),
            ("Diagnosed", "diagnosisDate"),
        ]);

        let resolved = resolve_mapping(&mapping).unwrap();
        assert_eq!(resolved.len(), 4);
        assert_eq!(resolved.field_for("Kind"), Some(CanonicalField::Species));
        assert_eq!(
            resolved.field_for("Diagnosed"),
            Some(CanonicalField::DiagnosisDate)
        );
        assert_eq!(resolved.field_for("Missing Column"), None);
    }

    #[test]
    fn test_resolve_reports_all_missing_required() {
        // Only patientName and species mapped: breed and diagnosisDate are
        // both reported in a single resolution pass.
        let mapping = mapping_of(&[("Pet Name", "patientName"), ("Kind", "species")]);

        let err = resolve_mapping(&mapping).unwrap_err();
        assert_eq!(err.problems.len(), 2);
        assert!(err.problems.contains(&MappingProblem::MissingRequired {
            field: CanonicalField::Breed
        }));
        assert!(err.problems.contains(&MappingProblem::MissingRequired {
            field: CanonicalField::DiagnosisDate
        }));
    }

    #[test]
    fn test_resolve_reports_unknown_fields() {
        let mapping = mapping_of(&[
            ("Kind", "species"),
            ("Breed", "breed"),
            ("Diagnosed", "diagnosisDate"),
            ("Owner", "ownerName"),
        ]);

        let err = resolve_mapping(&mapping).unwrap_err();
        assert_eq!(err.problems.len(), 1);
        assert_eq!(
            err.problems[0],
            MappingProblem::UnknownField {
                header: "Owner".to_string(),
                target: "ownerName".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_reports_duplicate_targets() {
        let mapping = mapping_of(&[
            ("Kind", "species"),
            ("Type", "species"),
            ("Breed", "breed"),
            ("Diagnosed", "diagnosisDate"),
        ]);

        let err = resolve_mapping(&mapping).unwrap_err();
        assert_eq!(err.problems.len(), 1);
        match &err.problems[0] {
            MappingProblem::DuplicateTarget { field, headers } => {
                assert_eq!(*field, CanonicalField::Species);
                assert_eq!(headers.len(), 2);
                assert!(headers.contains(&"Kind".to_string()));
                assert!(headers.contains(&"Type".to_string()));
            }
            other => panic!("expected duplicate target, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_mixes_problem_kinds() {
        // Unknown target, missing requireds and a duplicate all at once.
        let mapping = mapping_of(&[
            ("Pet", "patientName"),
            ("Name", "patientName"),
            ("Owner", "ownerName"),
        ]);

        let err = resolve_mapping(&mapping).unwrap_err();
        assert_eq!(err.problems.len(), 5);

        let missing: Vec<_> = err
            .problems
            .iter()
            .filter(|p| matches!(p, MappingProblem::MissingRequired { .. }))
            .collect();
        assert_eq!(missing.len(), 3);

        let display = err.to_string();
        assert!(display.contains("invalid column mapping"));
        assert!(display.contains("ownerName"));
        assert!(display.contains("patientName"));
    }

    #[test]
    fn test_resolve_empty_mapping() {
        let err = resolve_mapping(&FieldMapping::default()).unwrap_err();
        assert_eq!(err.problems.len(), REQUIRED_FIELDS.len());
    }

    #[test]
    fn test_field_mapping_serde_transparent() {
        let mapping = mapping_of(&[("Kind", "species")]);
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["Kind"], "species");

        let back: FieldMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, mapping);
    }
}
