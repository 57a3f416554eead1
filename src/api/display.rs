// Human-facing number formatting for progress output.

/// `1234567` -> `1,234,567`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn hex64(value: u64) -> String {
    format!("0x{value:016X}")
}

pub fn mebibytes(len: u64) -> String {
    format!("{:.2} MB", len as f64 / (1024.0 * 1024.0))
}
