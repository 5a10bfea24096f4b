//! Chinese numeral conversion for season/episode markers like `第十二集`

/// Convert an Arabic, Chinese or mixed numeral (`12`, `十二`, `二十3`) to an integer
pub fn parse_cn_number(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok();
    }

    let mut total: u32 = 0;
    let mut current: u32 = 0;
    for c in text.chars() {
        if let Some(d) = digit_value(c) {
            current = current.checked_mul(10)?.checked_add(d)?;
        } else if let Some(unit) = unit_value(c) {
            // A bare unit ("十") counts as one of that unit
            let multiplier = if current == 0 { 1 } else { current };
            total = total.checked_add(multiplier.checked_mul(unit)?)?;
            current = 0;
        } else {
            return None;
        }
    }
    total.checked_add(current)
}

fn digit_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        '零' | '〇' => Some(0),
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    }
}

fn unit_value(c: char) -> Option<u32> {
    match c {
        '十' => Some(10),
        '百' => Some(100),
        '千' => Some(1000),
        _ => None,
    }
}
