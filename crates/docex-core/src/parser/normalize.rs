//! Text cleanup and value normalization tables.

use chrono::{Datelike, NaiveDate};

/// English country names printed on residence cards, mapped to the Japanese form.
const NATIONALITIES: &[(&str, &str)] = &[
    ("VIETNAM", "ベトナム"),
    ("VIET NAM", "ベトナム"),
    ("CHINA", "中国"),
    ("PHILIPPINES", "フィリピン"),
    ("INDONESIA", "インドネシア"),
    ("NEPAL", "ネパール"),
    ("BRAZIL", "ブラジル"),
    ("PERU", "ペルー"),
    ("KOREA", "韓国"),
    ("THAILAND", "タイ"),
    ("MYANMAR", "ミャンマー"),
    ("SRI LANKA", "スリランカ"),
    ("BANGLADESH", "バングラデシュ"),
    ("INDIA", "インド"),
    ("MONGOLIA", "モンゴル"),
    ("CAMBODIA", "カンボジア"),
    ("TAIWAN", "台湾"),
    ("PAKISTAN", "パキスタン"),
    ("UZBEKISTAN", "ウズベキスタン"),
];

/// Fold full-width ASCII variants and the ideographic space to plain ASCII.
pub fn fold_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

/// Width-fold, collapse horizontal whitespace, trim lines and drop empty ones.
pub fn clean_text(text: &str) -> String {
    fold_width(text)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map gender spellings to 男性 / 女性. Unknown input passes through trimmed.
pub fn normalize_gender(value: &str) -> String {
    let trimmed = value.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "男" | "男性" | "M" | "MALE" => "男性".to_string(),
        "女" | "女性" | "F" | "FEMALE" => "女性".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Map English country names to Japanese. Unknown input passes through trimmed.
pub fn normalize_nationality(value: &str) -> String {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    NATIONALITIES
        .iter()
        .find(|(en, _)| *en == upper)
        .map(|(_, ja)| ja.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Upper-case and strip whitespace (card and license numbers).
pub fn normalize_identifier(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Keep digits, `+` and `-`; reject anything with too few digits.
pub fn normalize_phone(value: &str) -> Option<String> {
    let kept: String = fold_width(value)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+' || *c == '-')
        .collect();
    let digits = kept.chars().filter(|c| c.is_ascii_digit()).count();
    (10..=15).contains(&digits).then_some(kept)
}

/// `1234567` or `123-4567` to `123-4567`.
pub fn normalize_postal_code(value: &str) -> Option<String> {
    let digits: String = fold_width(value).chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 7).then(|| format!("{}-{}", &digits[..3], &digits[3..]))
}

/// Full years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if birth > today {
        return None;
    }
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

/// Values providers use to say "nothing here".
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || matches!(
            v.to_ascii_lowercase().as_str(),
            "null" | "none" | "n/a" | "na" | "unknown" | "-"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_width() {
        assert_eq!(fold_width("１９９０年０１月"), "1990年01月");
        assert_eq!(fold_width("ＡＢ１２：\u{3000}x"), "AB12: x");
        assert_eq!(fold_width("カタカナー"), "カタカナー");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  氏名   山田\u{3000}太郎 \n\n  住所 東京都 "), "氏名 山田 太郎\n住所 東京都");
    }

    #[test]
    fn test_gender_table() {
        assert_eq!(normalize_gender("男"), "男性");
        assert_eq!(normalize_gender("F"), "女性");
        assert_eq!(normalize_gender("male"), "男性");
        assert_eq!(normalize_gender("X"), "X");
    }

    #[test]
    fn test_nationality_table() {
        assert_eq!(normalize_nationality("VIETNAM"), "ベトナム");
        assert_eq!(normalize_nationality("Philippines"), "フィリピン");
        assert_eq!(normalize_nationality("ベトナム"), "ベトナム");
        assert_eq!(normalize_nationality(" FRANCE "), "FRANCE");
    }

    #[test]
    fn test_phone_and_postal() {
        assert_eq!(normalize_phone("090-1234-5678").as_deref(), Some("090-1234-5678"));
        assert_eq!(normalize_phone("12-34"), None);
        assert_eq!(normalize_postal_code("160 0023").as_deref(), Some("160-0023"));
        assert_eq!(normalize_postal_code("16000"), None);
    }

    #[test]
    fn test_age_on() {
        let birth = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2020, 6, 14).unwrap()), Some(29));
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2020, 6, 15).unwrap()), Some(30));
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()), None);
    }

    #[test]
    fn test_placeholder_values() {
        assert!(is_placeholder(" "));
        assert!(is_placeholder("null"));
        assert!(is_placeholder("N/A"));
        assert!(!is_placeholder("山田"));
    }
}
