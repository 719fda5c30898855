//! Document schemas: which fields each document type carries.
//!
//! Schemas are static. Every field has a hint sent to the structured
//! provider and a [`FieldKind`] that drives normalization in the text
//! parser.

mod validator;

pub use validator::ResultValidator;

use crate::models::DocumentType;

/// Canonical field names.
pub mod fields {
    pub const NAME: &str = "name";
    pub const NAME_KANA: &str = "name_kana";
    pub const BIRTH_DATE: &str = "birth_date";
    pub const AGE: &str = "age";
    pub const GENDER: &str = "gender";
    pub const NATIONALITY: &str = "nationality";
    pub const ADDRESS: &str = "address";
    pub const POSTAL_CODE: &str = "postal_code";
    pub const CARD_NUMBER: &str = "card_number";
    pub const VISA_TYPE: &str = "visa_type";
    pub const VISA_EXPIRY: &str = "visa_expiry";
    pub const ISSUE_DATE: &str = "issue_date";
    pub const PERMISSION_DATE: &str = "permission_date";
    pub const LICENSE_NUMBER: &str = "license_number";
    pub const LICENSE_TYPE: &str = "license_type";
    pub const LICENSE_EXPIRY: &str = "license_expiry";
    pub const LICENSE_COLOR: &str = "license_color";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const RAW_TEXT: &str = "raw_text";
}

/// How a field's value is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Normalized to `YYYY-MM-DD`; unparseable values are dropped.
    Date,
    Gender,
    Nationality,
    /// Upper-cased, whitespace removed.
    Identifier,
    Phone,
    Email,
    PostalCode,
    /// Free text kept verbatim apart from trimming.
    RawText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub hint: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind, hint: &'static str) -> FieldSpec {
    FieldSpec { name, hint, kind }
}

/// Field contract for one document type.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentSchema {
    pub document_type: DocumentType,
    pub required: &'static [FieldSpec],
    pub optional: &'static [FieldSpec],
}

impl DocumentSchema {
    /// Required fields first, then optional ones.
    pub fn all_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.required.iter().chain(self.optional.iter())
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.all_fields().find(|f| f.name == name)
    }

    /// Raw-text-only mode: no structured fields are expected.
    pub fn is_generic(&self) -> bool {
        self.document_type == DocumentType::Generic
    }
}

use fields::*;
use FieldKind::*;

static ZAIRYU_CARD: DocumentSchema = DocumentSchema {
    document_type: DocumentType::ZairyuCard,
    required: &[
        field(NAME, Text, "Full name as printed on the card (氏名 / NAME)"),
        field(BIRTH_DATE, Date, "Date of birth (生年月日) in YYYY-MM-DD"),
    ],
    optional: &[
        field(NAME_KANA, Text, "Name in katakana if printed"),
        field(GENDER, Gender, "Sex (性別): 男性 or 女性"),
        field(NATIONALITY, Nationality, "Nationality or region (国籍・地域)"),
        field(ADDRESS, Text, "Residential address (住居地)"),
        field(POSTAL_CODE, PostalCode, "Postal code (〒) if printed"),
        field(CARD_NUMBER, Identifier, "Residence card number: two letters, eight digits, two letters"),
        field(VISA_TYPE, Text, "Status of residence (在留資格)"),
        field(VISA_EXPIRY, Date, "Period of stay expiry date (在留期間 満了日) in YYYY-MM-DD"),
        field(ISSUE_DATE, Date, "Date of issue (交付年月日) in YYYY-MM-DD"),
        field(PERMISSION_DATE, Date, "Date of permission (許可年月日) in YYYY-MM-DD"),
    ],
};

static LICENSE: DocumentSchema = DocumentSchema {
    document_type: DocumentType::License,
    required: &[field(NAME, Text, "Full name (氏名)")],
    optional: &[
        field(BIRTH_DATE, Date, "Date of birth (生年月日) in YYYY-MM-DD"),
        field(ADDRESS, Text, "Address (住所)"),
        field(POSTAL_CODE, PostalCode, "Postal code (〒) if printed"),
        field(LICENSE_NUMBER, Identifier, "License number (免許証番号), 12 digits"),
        field(LICENSE_TYPE, Text, "License categories (免許の種類), e.g. 普通"),
        field(LICENSE_EXPIRY, Date, "Valid until date (有効期限) in YYYY-MM-DD"),
        field(ISSUE_DATE, Date, "Date of issue (交付) in YYYY-MM-DD"),
        field(LICENSE_COLOR, Text, "Expiry band color: ゴールド, ブルー or グリーン"),
    ],
};

static RIREKISHO: DocumentSchema = DocumentSchema {
    document_type: DocumentType::Rirekisho,
    required: &[field(NAME, Text, "Applicant full name (氏名)")],
    optional: &[
        field(NAME_KANA, Text, "Name reading (フリガナ / ふりがな)"),
        field(BIRTH_DATE, Date, "Date of birth (生年月日) in YYYY-MM-DD"),
        field(GENDER, Gender, "Sex: 男性 or 女性"),
        field(ADDRESS, Text, "Current address (現住所)"),
        field(POSTAL_CODE, PostalCode, "Postal code (〒)"),
        field(PHONE, Phone, "Telephone or mobile number (電話)"),
        field(EMAIL, Email, "E-mail address"),
    ],
};

static GENERIC: DocumentSchema = DocumentSchema {
    document_type: DocumentType::Generic,
    required: &[],
    optional: &[field(RAW_TEXT, RawText, "Full transcription of all visible text, line by line")],
};

/// Look up the static schema for a document type.
pub fn schema_for(document_type: DocumentType) -> &'static DocumentSchema {
    match document_type {
        DocumentType::ZairyuCard => &ZAIRYU_CARD,
        DocumentType::License => &LICENSE,
        DocumentType::Rirekisho => &RIREKISHO,
        DocumentType::Generic => &GENERIC,
    }
}
