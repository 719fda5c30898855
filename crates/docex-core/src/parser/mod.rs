//! Rule-based conversion of raw OCR text into schema fields.

pub mod dates;
pub mod normalize;
pub mod patterns;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::models::Fields;
use crate::schema::fields::*;
use crate::schema::{DocumentSchema, FieldKind, FieldSpec};

pub use dates::{normalize_date, DateExtractor};
use normalize::{
    age_on, clean_text, fold_width, is_placeholder, normalize_gender, normalize_identifier,
    normalize_nationality, normalize_phone, normalize_postal_code,
};
use patterns::*;

/// Trait for single-field extractors.
pub trait FieldExtractor {
    type Output;

    /// First occurrence in the text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// All occurrences, in text order.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// A value found in text, with where it came from.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    pub value: T,
    /// Byte range in the source text.
    pub position: Option<(usize, usize)>,
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}

/// Count of letters, digits, kana and ideographs; used to rank OCR candidates.
pub fn meaningful_chars(text: &str) -> usize {
    MEANINGFUL_CHAR.find_iter(text).count()
}

/// Ordered pattern variants for a field: native label, Latin label, positional.
fn rules_for(field: &str) -> Vec<&'static Regex> {
    match field {
        NAME => vec![&*NAME_NATIVE, &*NAME_LATIN, &*NAME_LATIN_LINE, &*NAME_CJK_LINE],
        NAME_KANA => vec![&*NAME_KANA_LABELED],
        BIRTH_DATE => vec![&*BIRTH_DATE_NATIVE, &*BIRTH_DATE_LATIN, &*BIRTH_DATE_SUFFIX],
        GENDER => vec![&*GENDER_NATIVE, &*GENDER_LATIN, &*GENDER_WORD],
        NATIONALITY => vec![&*NATIONALITY_NATIVE, &*NATIONALITY_LATIN, &*NATIONALITY_KNOWN],
        ADDRESS => vec![&*ADDRESS_NATIVE, &*ADDRESS_LATIN, &*ADDRESS_PREFECTURE],
        POSTAL_CODE => vec![&*POSTAL_CODE_MARKED],
        CARD_NUMBER => vec![&*CARD_NUMBER_LABELED, &*CARD_NUMBER_BARE],
        VISA_TYPE => vec![&*VISA_TYPE_NATIVE, &*VISA_TYPE_LATIN],
        VISA_EXPIRY => vec![&*VISA_EXPIRY_NATIVE, &*VISA_EXPIRY_LATIN, &*VALID_UNTIL],
        ISSUE_DATE => vec![&*ISSUE_DATE_LABELED],
        PERMISSION_DATE => vec![&*PERMISSION_DATE_LABELED],
        LICENSE_NUMBER => vec![&*LICENSE_NUMBER_LABELED, &*LICENSE_NUMBER_BARE],
        LICENSE_TYPE => vec![&*LICENSE_TYPE_LABELED, &*LICENSE_TYPE_TOKENS],
        LICENSE_EXPIRY => vec![&*LICENSE_EXPIRY_LABELED, &*VALID_UNTIL],
        LICENSE_COLOR => vec![&*LICENSE_COLOR_WORD],
        PHONE => vec![&*PHONE_LABELED, &*PHONE_BARE],
        EMAIL => vec![&*EMAIL_ADDRESS],
        _ => Vec::new(),
    }
}

/// Cut `value` at the first match of `pattern` (first capture group if present).
fn truncate_at(value: &str, pattern: &Regex) -> String {
    let cut = pattern
        .captures(value)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.start());
    match cut {
        Some(idx) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

fn is_heading(value: &str) -> bool {
    let upper = value.to_uppercase();
    HEADING_WORDS.iter().any(|h| upper.contains(h))
}

/// Converts raw text to fields and normalizes structured provider output.
pub struct TextParser {
    dates: DateExtractor,
}

impl TextParser {
    pub fn new() -> Self {
        Self {
            dates: DateExtractor::new(),
        }
    }

    /// Parse raw OCR text into the fields of `schema`.
    ///
    /// Fields without a match are left absent.
    pub fn parse(&self, raw_text: &str, schema: &DocumentSchema) -> Fields {
        let text = clean_text(raw_text);
        let mut fields = Fields::new();
        if text.is_empty() {
            return fields;
        }

        for spec in schema.all_fields() {
            if let Some(value) = self.extract_field(&text, spec) {
                fields.insert(spec.name.to_string(), value);
            }
        }

        debug!(
            "Parsed {} of {} {} fields from {} chars",
            fields.len(),
            schema.all_fields().count(),
            schema.document_type,
            text.chars().count()
        );
        fields
    }

    /// Normalize fields returned by a structured provider.
    ///
    /// Unknown keys and placeholder values are dropped; dates that do not
    /// parse are dropped rather than passed through.
    pub fn normalize_fields(&self, fields: &Fields, schema: &DocumentSchema) -> Fields {
        fields
            .iter()
            .filter(|(_, value)| !is_placeholder(value))
            .filter_map(|(name, value)| {
                let spec = schema.field(name)?;
                let value = match spec.kind {
                    FieldKind::Text | FieldKind::RawText => value.trim().to_string(),
                    _ => fold_width(value),
                };
                self.normalize_value(spec, &value)
                    .map(|normalized| (name.clone(), normalized))
            })
            .collect()
    }

    /// Add values computed from other fields (currently `age`).
    pub fn derive_fields(&self, fields: &mut Fields, today: NaiveDate) {
        if fields.contains_key(AGE) {
            return;
        }
        let age = fields
            .get(BIRTH_DATE)
            .and_then(|b| NaiveDate::parse_from_str(b, "%Y-%m-%d").ok())
            .and_then(|birth| age_on(birth, today));
        if let Some(age) = age {
            fields.insert(AGE.to_string(), age.to_string());
        }
    }

    fn extract_field(&self, text: &str, spec: &FieldSpec) -> Option<String> {
        if spec.kind == FieldKind::RawText {
            return Some(text.to_string());
        }

        for pattern in rules_for(spec.name) {
            for caps in pattern.captures_iter(text) {
                let Some(capture) = caps.get(1) else {
                    continue;
                };
                if let Some(value) = self.finalize_capture(spec, capture.as_str()) {
                    return Some(value);
                }
            }
        }
        None
    }

    fn finalize_capture(&self, spec: &FieldSpec, raw: &str) -> Option<String> {
        let mut value = raw.trim().to_string();

        if matches!(spec.kind, FieldKind::Text | FieldKind::Nationality) {
            value = truncate_at(&value, &STOP_LABELS);
        }
        if spec.name == NAME {
            value = truncate_at(&value, &NAME_STOP);
            if is_heading(&value) {
                return None;
            }
        }
        if spec.name == ADDRESS {
            value = POSTAL_CODE_MARKED.replace_all(&value, "").into_owned();
        }

        let value = value.trim_matches(|c: char| c.is_whitespace() || ":,、。()（）/".contains(c));
        if is_placeholder(value) {
            return None;
        }
        self.normalize_value(spec, value)
    }

    fn normalize_value(&self, spec: &FieldSpec, value: &str) -> Option<String> {
        match spec.kind {
            FieldKind::Text if spec.name == LICENSE_COLOR && value == "優良" => {
                Some("ゴールド".to_string())
            }
            FieldKind::Text | FieldKind::RawText => Some(value.trim().to_string()),
            FieldKind::Date => self
                .dates
                .extract(value)
                .map(|m| m.value.format("%Y-%m-%d").to_string()),
            FieldKind::Gender => Some(normalize_gender(value)),
            FieldKind::Nationality => Some(normalize_nationality(value)),
            FieldKind::Identifier => Some(normalize_identifier(value)),
            FieldKind::Phone => normalize_phone(value),
            FieldKind::Email => EMAIL_ADDRESS.find(value).map(|m| m.as_str().to_string()),
            FieldKind::PostalCode => normalize_postal_code(value),
        }
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use crate::schema::{schema_for, ResultValidator};
    use pretty_assertions::assert_eq;

    const ZAIRYU_TEXT: &str = "日本国政府 在留カード RESIDENCE CARD
番号 AB12345678CD
氏名 NGUYEN VAN AN
生年月日 1995年03月12日 性別 男 SEX M.
国籍・地域 VIETNAM
住居地 〒160-0023 東京都新宿区西新宿2丁目8番1号
在留資格 技術・人文知識・国際業務
在留期間(満了日) 5年 (2027年03月12日)
許可年月日 2022年03月12日 交付年月日 2022年03月15日";

    const LICENSE_TEXT: &str = "氏名 山田 太郎 昭和60年 1月 1日生
住所 東京都千代田区霞が関2-1-2
交付 令和03年04月01日 12345
令和08年02月01日まで有効
優良
免許の種類 普通 中型
第 123456789012 号
東京都公安委員会";

    const RESUME_TEXT: &str = "履歴書
ふりがな やまだ はなこ
氏名 山田 花子
生年月日 平成2年4月10日生 (満34歳)
現住所 〒100-0001 東京都千代田区千代田1-1
電話 090-1234-5678
E-mail hanako.yamada@example.jp";

    fn field<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
        fields.get(name).map(String::as_str)
    }

    #[test]
    fn test_parse_zairyu_card() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::ZairyuCard);
        let fields = parser.parse(ZAIRYU_TEXT, schema);

        assert_eq!(field(&fields, NAME), Some("NGUYEN VAN AN"));
        assert_eq!(field(&fields, BIRTH_DATE), Some("1995-03-12"));
        assert_eq!(field(&fields, GENDER), Some("男性"));
        assert_eq!(field(&fields, NATIONALITY), Some("ベトナム"));
        assert_eq!(field(&fields, CARD_NUMBER), Some("AB12345678CD"));
        assert_eq!(field(&fields, ADDRESS), Some("東京都新宿区西新宿2丁目8番1号"));
        assert_eq!(field(&fields, POSTAL_CODE), Some("160-0023"));
        assert_eq!(field(&fields, VISA_TYPE), Some("技術・人文知識・国際業務"));
        assert_eq!(field(&fields, VISA_EXPIRY), Some("2027-03-12"));
        assert_eq!(field(&fields, PERMISSION_DATE), Some("2022-03-12"));
        assert_eq!(field(&fields, ISSUE_DATE), Some("2022-03-15"));
        assert!(ResultValidator::new().is_valid(&fields, schema));
    }

    #[test]
    fn test_parse_license() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::License);
        let fields = parser.parse(LICENSE_TEXT, schema);

        assert_eq!(field(&fields, NAME), Some("山田 太郎"));
        assert_eq!(field(&fields, BIRTH_DATE), Some("1985-01-01"));
        assert_eq!(field(&fields, LICENSE_NUMBER), Some("123456789012"));
        assert_eq!(field(&fields, LICENSE_EXPIRY), Some("2026-02-01"));
        assert_eq!(field(&fields, ISSUE_DATE), Some("2021-04-01"));
        assert_eq!(field(&fields, LICENSE_TYPE), Some("普通 中型"));
        assert_eq!(field(&fields, LICENSE_COLOR), Some("ゴールド"));
        assert!(ResultValidator::new().is_valid(&fields, schema));
    }

    #[test]
    fn test_parse_rirekisho() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::Rirekisho);
        let fields = parser.parse(RESUME_TEXT, schema);

        assert_eq!(field(&fields, NAME), Some("山田 花子"));
        assert_eq!(field(&fields, NAME_KANA), Some("やまだ はなこ"));
        assert_eq!(field(&fields, BIRTH_DATE), Some("1990-04-10"));
        assert_eq!(field(&fields, ADDRESS), Some("東京都千代田区千代田1-1"));
        assert_eq!(field(&fields, PHONE), Some("090-1234-5678"));
        assert_eq!(field(&fields, EMAIL), Some("hanako.yamada@example.jp"));
        assert!(ResultValidator::new().is_valid(&fields, schema));
    }

    #[test]
    fn test_full_width_input() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::ZairyuCard);
        let fields = parser.parse("氏名　ＴＲＡＮ ＴＨＩ ＢＩＮＨ\n生年月日　１９９８年１２月０１日", schema);

        assert_eq!(field(&fields, NAME), Some("TRAN THI BINH"));
        assert_eq!(field(&fields, BIRTH_DATE), Some("1998-12-01"));
    }

    #[test]
    fn test_latin_labels_and_positional_fallbacks() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::ZairyuCard);
        let text = "RESIDENCE CARD\nSANTOS MARIA CLARA\nDATE OF BIRTH 02 JAN 1990\nSEX F\nPHILIPPINES";
        let fields = parser.parse(text, schema);

        assert_eq!(field(&fields, NAME), Some("SANTOS MARIA CLARA"));
        assert_eq!(field(&fields, BIRTH_DATE), Some("1990-01-02"));
        assert_eq!(field(&fields, GENDER), Some("女性"));
        assert_eq!(field(&fields, NATIONALITY), Some("フィリピン"));
    }

    #[test]
    fn test_invalid_date_leaves_field_absent() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::ZairyuCard);
        let fields = parser.parse("氏名 LE VAN B\n生年月日 平成40年2月30日", schema);

        assert_eq!(field(&fields, NAME), Some("LE VAN B"));
        assert_eq!(field(&fields, BIRTH_DATE), None);
    }

    #[test]
    fn test_generic_returns_raw_text() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::Generic);
        let fields = parser.parse("  請求書\n\n合計 1,000円 ", schema);

        assert_eq!(fields.len(), 1);
        assert_eq!(field(&fields, RAW_TEXT), Some("請求書\n合計 1,000円"));
    }

    #[test]
    fn test_empty_text_yields_no_fields() {
        let parser = TextParser::new();
        assert!(parser.parse("  \n ", schema_for(DocumentType::License)).is_empty());
    }

    #[test]
    fn test_normalize_structured_fields() {
        let parser = TextParser::new();
        let schema = schema_for(DocumentType::ZairyuCard);
        let mut input = Fields::new();
        input.insert(NAME.into(), " NGUYEN VAN AN ".into());
        input.insert(BIRTH_DATE.into(), "平成7年3月12日".into());
        input.insert(GENDER.into(), "M".into());
        input.insert(NATIONALITY.into(), "VIETNAM".into());
        input.insert(VISA_EXPIRY.into(), "unreadable".into());
        input.insert(ADDRESS.into(), "null".into());
        input.insert("favourite_colour".into(), "blue".into());

        let fields = parser.normalize_fields(&input, schema);

        let mut expected = Fields::new();
        expected.insert(NAME.into(), "NGUYEN VAN AN".into());
        expected.insert(BIRTH_DATE.into(), "1995-03-12".into());
        expected.insert(GENDER.into(), "男性".into());
        expected.insert(NATIONALITY.into(), "ベトナム".into());
        assert_eq!(fields, expected);
    }

    #[test]
    fn test_derive_age() {
        let parser = TextParser::new();
        let mut fields = Fields::new();
        fields.insert(BIRTH_DATE.into(), "1995-03-12".into());
        parser.derive_fields(&mut fields, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(field(&fields, AGE), Some("29"));
    }

    #[test]
    fn test_meaningful_chars() {
        assert_eq!(meaningful_chars("ab 12 山田 カナ ...!!"), 8);
        assert_eq!(meaningful_chars("|||---"), 0);
    }
}
