/// Render a byte count with the largest unit it stays below 1024 in,
/// e.g. `2048` becomes `"2.00 KB"`. Everything at or above 1024 GB is
/// reported in TB.
pub fn display_file_size(size: u64) -> String {
    let mut size = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

/// Render a count with thousands separators, e.g. `1234567` becomes
/// `"1,234,567"`.
pub fn display_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, digit) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}
