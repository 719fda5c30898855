//! Regex patterns for Japanese identity documents.
//!
//! Patterns run over text that has already been width-folded (full-width
//! digits, letters and punctuation mapped to ASCII). Each field pattern has
//! exactly one capture group holding the candidate value.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Era dates: 令和3年5月1日, 平成元年12月31日, H2.3.4
    pub static ref DATE_ERA_KANJI: Regex = Regex::new(
        r"(明治|大正|昭和|平成|令和)\s*(元|\d{1,2})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日?"
    ).unwrap();

    pub static ref DATE_ERA_LETTER: Regex = Regex::new(
        r"(?:^|[^A-Za-z])([MTSHR])\s*(\d{1,2})[./\-](\d{1,2})[./\-](\d{1,2})(?:[^0-9]|$)"
    ).unwrap();

    // Gregorian dates
    pub static ref DATE_YMD_KANJI: Regex = Regex::new(
        r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日?"
    ).unwrap();

    pub static ref DATE_YMD: Regex = Regex::new(
        r"(?:^|[^0-9])(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})(?:[^0-9]|$)"
    ).unwrap();

    pub static ref DATE_DMY: Regex = Regex::new(
        r"(?:^|[^0-9])(\d{1,2})[./\-](\d{1,2})[./\-](\d{4})(?:[^0-9]|$)"
    ).unwrap();

    pub static ref DATE_YMD_SPACED: Regex = Regex::new(
        r"(?:^|[^0-9])(\d{4})\s+(\d{2})\s+(\d{2})(?:[^0-9]|$)"
    ).unwrap();

    pub static ref DATE_DAY_MONTH_NAME: Regex = Regex::new(
        r"(?i)(?:^|[^0-9])(\d{1,2})\s*(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC)[A-Z]*\.?\s*,?\s*(\d{4})(?:[^0-9]|$)"
    ).unwrap();

    pub static ref DATE_MONTH_NAME_DAY: Regex = Regex::new(
        r"(?i)(?:^|[^A-Za-z])(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC)[A-Z]*\.?\s+(\d{1,2})\s*,?\s*(\d{4})(?:[^0-9]|$)"
    ).unwrap();

    // Labels that end a captured value when OCR merges several fields on one line.
    pub static ref STOP_LABELS: Regex = Regex::new(
        r"(?i)(?:^|[^A-Za-z])(生\s*年\s*月\s*日|性\s*別|国\s*籍|住\s*居\s*地|住\s*所|在\s*留|資\s*格|番\s*号|交\s*付|有\s*効|就\s*労|許\s*可|DATE\s+OF\s+BIRTH|SEX|NATIONALITY|ADDRESS|RESIDENCE|STATUS|NUMBER|PERIOD\s+OF\s+STAY|NAME)(?:[^A-Za-z]|$)"
    ).unwrap();

    pub static ref NAME_STOP: Regex = Regex::new(
        r"[0-9]|明治|大正|昭和|平成|令和"
    ).unwrap();

    // Name
    pub static ref NAME_NATIVE: Regex = Regex::new(
        r"(?m)氏\s*名\s*[:]?\s*([^\n]+)"
    ).unwrap();

    pub static ref NAME_LATIN: Regex = Regex::new(
        r"(?m)(?:^|[^A-Za-z])NAME\s*[:]?\s*([A-Za-z][A-Za-z ,.'\-]*[A-Za-z])"
    ).unwrap();

    pub static ref NAME_LATIN_LINE: Regex = Regex::new(
        r"(?m)^\s*([A-Z]{2,}(?: [A-Z]{2,}){1,3})\s*$"
    ).unwrap();

    pub static ref NAME_CJK_LINE: Regex = Regex::new(
        r"(?m)^\s*([\p{Han}]{1,4} ?[\p{Han}]{1,4})\s*$"
    ).unwrap();

    pub static ref NAME_KANA_LABELED: Regex = Regex::new(
        r"(?m)(?:フリガナ|ふりがな)\s*[:]?\s*([\p{Katakana}\p{Hiragana}ー ]+)"
    ).unwrap();

    // Birth date
    pub static ref BIRTH_DATE_NATIVE: Regex = Regex::new(
        r"(?m)生\s*年\s*月\s*日\s*[:]?\s*([^\n]{6,40})"
    ).unwrap();

    pub static ref BIRTH_DATE_LATIN: Regex = Regex::new(
        r"(?im)DATE\s+OF\s+BIRTH\s*[:]?\s*([^\n]{6,40})"
    ).unwrap();

    pub static ref BIRTH_DATE_SUFFIX: Regex = Regex::new(
        r"((?:明治|大正|昭和|平成|令和)\s*(?:元|\d{1,2})\s*年\s*\d{1,2}\s*月\s*\d{1,2}\s*日)\s*生"
    ).unwrap();

    // Gender
    pub static ref GENDER_NATIVE: Regex = Regex::new(
        r"性\s*別\s*[:]?\s*(男|女)"
    ).unwrap();

    pub static ref GENDER_LATIN: Regex = Regex::new(
        r"(?i)(?:^|[^A-Za-z])SEX\s*[:.]?\s*(MALE|FEMALE|M|F)(?:[^A-Za-z]|$)"
    ).unwrap();

    pub static ref GENDER_WORD: Regex = Regex::new(
        r"(男性|女性)"
    ).unwrap();

    // Nationality
    pub static ref NATIONALITY_NATIVE: Regex = Regex::new(
        r"国\s*籍(?:\s*[・･]?\s*地\s*域)?\s*[:]?\s*([^\s0-9:]+)"
    ).unwrap();

    pub static ref NATIONALITY_LATIN: Regex = Regex::new(
        r"(?i)NATIONALITY(?:\s*/\s*REGION)?\s*[:]?\s*(SRI LANKA|VIET NAM|[A-Za-z]+)"
    ).unwrap();

    pub static ref NATIONALITY_KNOWN: Regex = Regex::new(
        r"(?:^|[^A-Za-z])(VIETNAM|VIET NAM|CHINA|PHILIPPINES|INDONESIA|NEPAL|BRAZIL|PERU|KOREA|THAILAND|MYANMAR|SRI LANKA|BANGLADESH|INDIA|MONGOLIA|CAMBODIA|TAIWAN|PAKISTAN|UZBEKISTAN)(?:[^A-Za-z]|$)"
    ).unwrap();

    // Address
    pub static ref ADDRESS_NATIVE: Regex = Regex::new(
        r"(?m)(?:住\s*居\s*地|現\s*住\s*所|住\s*所)\s*[:]?\s*([^\n]+)"
    ).unwrap();

    pub static ref ADDRESS_LATIN: Regex = Regex::new(
        r"(?im)(?:^|[^A-Za-z])ADDRESS\s*[:]?\s*([^\n]+)"
    ).unwrap();

    pub static ref ADDRESS_PREFECTURE: Regex = Regex::new(
        r"(?m)((?:東京都|北海道|京都府|大阪府|[\p{Han}]{2,3}県)[^\n]+)"
    ).unwrap();

    pub static ref POSTAL_CODE_MARKED: Regex = Regex::new(
        r"(?:〒|郵便番号\s*[:]?)\s*(\d{3}\s*[-ー－]?\s*\d{4})"
    ).unwrap();

    // Residence card
    pub static ref CARD_NUMBER_LABELED: Regex = Regex::new(
        r"(?i)(?:番\s*号|NUMBER|No\.?)\s*[:]?\s*([A-Z]{2}\s*\d{8}\s*[A-Z]{2})"
    ).unwrap();

    pub static ref CARD_NUMBER_BARE: Regex = Regex::new(
        r"(?:^|[^A-Za-z])([A-Z]{2}\s?\d{8}\s?[A-Z]{2})(?:[^A-Za-z]|$)"
    ).unwrap();

    pub static ref VISA_TYPE_NATIVE: Regex = Regex::new(
        r"(?m)在\s*留\s*資\s*格\s*[:]?\s*([^\n]+)"
    ).unwrap();

    pub static ref VISA_TYPE_LATIN: Regex = Regex::new(
        r"(?im)(?:^|[^A-Za-z])STATUS(?:\s+OF\s+RESIDENCE)?\s*[:]?\s*([A-Za-z][^\n]+)"
    ).unwrap();

    pub static ref VISA_EXPIRY_NATIVE: Regex = Regex::new(
        r"(?m)(?:在\s*留\s*期\s*間|満\s*了\s*日)([^\n]*)"
    ).unwrap();

    pub static ref VISA_EXPIRY_LATIN: Regex = Regex::new(
        r"(?im)(?:PERIOD\s+OF\s+STAY|DATE\s+OF\s+EXPIRATION|EXPIRATION|EXPIRY)([^\n]*)"
    ).unwrap();

    pub static ref VALID_UNTIL: Regex = Regex::new(
        r"(?m)([^\n]{6,40}?)\s*まで\s*有\s*効"
    ).unwrap();

    pub static ref ISSUE_DATE_LABELED: Regex = Regex::new(
        r"(?m)交\s*付(?:\s*年\s*月\s*日)?([^\n]*)"
    ).unwrap();

    pub static ref PERMISSION_DATE_LABELED: Regex = Regex::new(
        r"(?m)許\s*可\s*年\s*月\s*日([^\n]*)"
    ).unwrap();

    // Driver's license
    pub static ref LICENSE_NUMBER_LABELED: Regex = Regex::new(
        r"(?:第|免\s*許\s*証\s*番\s*号|番\s*号)\s*[:]?\s*(\d{4}\s?\d{4}\s?\d{4})\s*号?"
    ).unwrap();

    pub static ref LICENSE_NUMBER_BARE: Regex = Regex::new(
        r"(?:^|[^0-9])(\d{12})(?:[^0-9]|$)"
    ).unwrap();

    pub static ref LICENSE_TYPE_LABELED: Regex = Regex::new(
        r"(?m)(?:免\s*許\s*の\s*種\s*類|種\s*類)\s*[:]?\s*([^\n]+)"
    ).unwrap();

    pub static ref LICENSE_TYPE_TOKENS: Regex = Regex::new(
        r"((?:大型特殊|大型|準中型|中型|普通|大特|大自二|普自二|小特|原付|けん引|牽引)(?:\s*(?:大型特殊|大型|準中型|中型|普通|大特|大自二|普自二|小特|原付|けん引|牽引))*)"
    ).unwrap();

    pub static ref LICENSE_EXPIRY_LABELED: Regex = Regex::new(
        r"(?m)有\s*効\s*期\s*限\s*[:]?([^\n]*)"
    ).unwrap();

    pub static ref LICENSE_COLOR_WORD: Regex = Regex::new(
        r"(ゴールド|ブルー|グリーン|優良)"
    ).unwrap();

    // Resume contact details
    pub static ref PHONE_LABELED: Regex = Regex::new(
        r"(?i)(?:電\s*話|携\s*帯|TEL|PHONE)\s*(?:番\s*号)?\s*[:.]?\s*(\+?\d[\d\-\s()]{8,16}\d)"
    ).unwrap();

    pub static ref PHONE_BARE: Regex = Regex::new(
        r"(?:^|[^0-9])(0\d{1,4}-\d{1,4}-\d{3,4})(?:[^0-9]|$)"
    ).unwrap();

    pub static ref EMAIL_ADDRESS: Regex = Regex::new(
        r"([A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,})"
    ).unwrap();

    // Offline OCR scoring: letters, digits, kana, CJK ideographs.
    pub static ref MEANINGFUL_CHAR: Regex = Regex::new(
        r"[A-Za-z0-9\p{Han}\p{Hiragana}\p{Katakana}ー]"
    ).unwrap();
}

/// Lines that look like names positionally but are card headings.
pub const HEADING_WORDS: &[&str] = &[
    "RESIDENCE CARD",
    "JAPAN",
    "GOVERNMENT OF JAPAN",
    "MINISTRY OF JUSTICE",
    "DRIVER LICENSE",
    "STATUS",
    "日本国政府",
    "在留",
    "法務省",
    "運転免許証",
    "公安委員会",
    "履歴書",
    "氏名",
    "住所",
];
