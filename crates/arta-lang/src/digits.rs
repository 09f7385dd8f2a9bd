const PERSIAN_DIGITS: [char; 10] = ['۰', '۱', '۲', '۳', '۴', '۵', '۶', '۷', '۸', '۹'];
const ARABIC_DIGITS: [char; 10] = ['٠', '١', '٢', '٣', '٤', '٥', '٦', '٧', '٨', '٩'];

/// Rewrites Persian and Arabic-Indic digits to ASCII so one regex set can
/// match amounts regardless of the keyboard the user typed on. Thousands
/// separators (`,` and `٬`) are dropped.
pub fn normalize_digits(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == ',' || ch == '٬' {
            continue;
        }
        if let Some(index) = PERSIAN_DIGITS.iter().position(|digit| *digit == ch) {
            normalized.push(char::from(b'0' + index as u8));
        } else if let Some(index) = ARABIC_DIGITS.iter().position(|digit| *digit == ch) {
            normalized.push(char::from(b'0' + index as u8));
        } else {
            normalized.push(ch);
        }
    }
    normalized
}

/// Rewrites ASCII digits to Persian digits for user-facing replies.
pub fn convert_to_persian_digits(text: &str) -> String {
    text.chars()
        .map(|ch| match ch.to_digit(10) {
            Some(value) if ch.is_ascii_digit() => PERSIAN_DIGITS[value as usize],
            _ => ch,
        })
        .collect()
}

/// Extracts every integer amount present in the text, after digit
/// normalization. Values too large for `u64` are skipped.
pub fn extract_amounts(text: &str) -> Vec<u64> {
    let normalized = normalize_digits(text);
    let mut amounts = Vec::new();
    let mut current = String::new();
    for ch in normalized.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            if let Ok(value) = current.parse::<u64>() {
                amounts.push(value);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(value) = current.parse::<u64>() {
            amounts.push(value);
        }
    }
    amounts
}

/// Groups an integer into three-digit chunks with Persian separators, then
/// maps the digits themselves to Persian.
pub fn format_persian_number(value: u64) -> String {
    let raw = value.to_string();
    let mut grouped = String::new();
    let digits = raw.as_bytes();
    for (index, digit) in digits.iter().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('٬');
        }
        grouped.push(*digit as char);
    }
    convert_to_persian_digits(&grouped)
}

#[cfg(test)]
mod tests {
    use super::{convert_to_persian_digits, extract_amounts, format_persian_number, normalize_digits};

    #[test]
    fn unit_normalize_digits_handles_persian_and_arabic_forms() {
        assert_eq!(normalize_digits("مالیات ۱۰۰۰۰۰۰۰"), "مالیات 10000000");
        assert_eq!(normalize_digits("٥٠٠"), "500");
        assert_eq!(normalize_digits("1,000٬000"), "1000000");
    }

    #[test]
    fn unit_extract_amounts_finds_every_number() {
        assert_eq!(extract_amounts("مالیات ۱۰۰۰۰۰۰۰ و ۵۰۰"), vec![10_000_000, 500]);
        assert!(extract_amounts("بدون عدد").is_empty());
    }

    #[test]
    fn unit_convert_to_persian_digits_round_trips() {
        let persian = convert_to_persian_digits("123");
        assert_eq!(persian, "۱۲۳");
        assert_eq!(normalize_digits(&persian), "123");
    }

    #[test]
    fn unit_format_persian_number_groups_thousands() {
        assert_eq!(format_persian_number(10_000_000), "۱۰٬۰۰۰٬۰۰۰");
        assert_eq!(format_persian_number(500), "۵۰۰");
    }
}
