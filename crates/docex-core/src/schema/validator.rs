//! Minimal-sufficiency checks per document type.

use crate::models::{DocumentType, Fields};

use super::fields::*;
use super::DocumentSchema;

/// Decides whether a provider's fields are good enough to accept.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultValidator;

impl ResultValidator {
    pub fn new() -> Self {
        Self
    }

    /// True when `fields` satisfies the minimum contract of `schema`.
    ///
    /// Blank values count as absent; an empty map is never valid.
    pub fn is_valid(&self, fields: &Fields, schema: &DocumentSchema) -> bool {
        if fields.values().all(|v| v.trim().is_empty()) {
            return false;
        }

        let has = |name: &str| fields.get(name).is_some_and(|v| !v.trim().is_empty());

        match schema.document_type {
            DocumentType::ZairyuCard => has(NAME) && has(BIRTH_DATE),
            DocumentType::License => {
                has(NAME) && (has(LICENSE_NUMBER) || has(LICENSE_EXPIRY) || has(LICENSE_TYPE))
            }
            DocumentType::Rirekisho => has(NAME) && (has(BIRTH_DATE) || has(ADDRESS)),
            DocumentType::Generic => has(RAW_TEXT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema_for;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_map_is_invalid_for_every_type() {
        let validator = ResultValidator::new();
        for doc in [
            DocumentType::ZairyuCard,
            DocumentType::License,
            DocumentType::Rirekisho,
            DocumentType::Generic,
        ] {
            assert!(!validator.is_valid(&Fields::new(), schema_for(doc)));
        }
    }

    #[test]
    fn test_zairyu_needs_name_and_birth_date() {
        let validator = ResultValidator::new();
        let schema = schema_for(DocumentType::ZairyuCard);

        assert!(validator.is_valid(
            &fields(&[(NAME, "NGUYEN VAN A"), (BIRTH_DATE, "1995-03-12")]),
            schema
        ));
        assert!(!validator.is_valid(&fields(&[(NAME, "NGUYEN VAN A")]), schema));
        assert!(!validator.is_valid(
            &fields(&[(NAME, "  "), (BIRTH_DATE, "1995-03-12")]),
            schema
        ));
    }

    #[test]
    fn test_license_needs_name_and_one_license_field() {
        let validator = ResultValidator::new();
        let schema = schema_for(DocumentType::License);

        assert!(!validator.is_valid(&fields(&[(NAME, "山田 太郎")]), schema));
        for extra in [LICENSE_NUMBER, LICENSE_EXPIRY, LICENSE_TYPE] {
            assert!(validator.is_valid(&fields(&[(NAME, "山田 太郎"), (extra, "x")]), schema));
        }
        assert!(!validator.is_valid(&fields(&[(LICENSE_NUMBER, "123456789012")]), schema));
    }

    #[test]
    fn test_rirekisho_needs_name_and_birth_or_address() {
        let validator = ResultValidator::new();
        let schema = schema_for(DocumentType::Rirekisho);

        assert!(validator.is_valid(&fields(&[(NAME, "佐藤 花子"), (ADDRESS, "東京都")]), schema));
        assert!(validator.is_valid(
            &fields(&[(NAME, "佐藤 花子"), (BIRTH_DATE, "1990-01-01")]),
            schema
        ));
        assert!(!validator.is_valid(&fields(&[(NAME, "佐藤 花子"), (PHONE, "090")]), schema));
    }

    #[test]
    fn test_generic_needs_raw_text() {
        let validator = ResultValidator::new();
        let schema = schema_for(DocumentType::Generic);
        assert!(validator.is_valid(&fields(&[(RAW_TEXT, "some text")]), schema));
        assert!(!validator.is_valid(&fields(&[(NAME, "someone")]), schema));
    }
}
