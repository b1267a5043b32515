//! Per-doctor colour themes. Presentation only: nothing downstream depends on
//! which theme a doctor receives beyond it being stable between runs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub primary: &'static str,
}

pub const THEMES: [Theme; 8] = [
    Theme { name: "Ocean", primary: "#06b6d4" },
    Theme { name: "Crimson", primary: "#dc2626" },
    Theme { name: "Forest", primary: "#10b981" },
    Theme { name: "Royal", primary: "#8b5cf6" },
    Theme { name: "Ruby", primary: "#ec4899" },
    Theme { name: "Golden", primary: "#f59e0b" },
    Theme { name: "Arctic", primary: "#3b82f6" },
    Theme { name: "Lavender", primary: "#6366f1" },
];

const ASSIGNED: [(&str, &str, usize); 8] = [
    ("Hamid", "Hajian", 0),
    ("Joseph", "Grace", 1),
    ("Liam", "Anderson", 2),
    ("Emma", "Wilson", 3),
    ("Sophia", "Martinez", 4),
    ("Noah", "Johnson", 5),
    ("Olivia", "Brown", 6),
    ("William", "Davis", 7),
];

pub fn theme_index(first_name: &str, last_name: &str) -> usize {
    ASSIGNED
        .iter()
        .find(|(first, last, _)| *first == first_name && *last == last_name)
        .map(|(_, _, index)| index % THEMES.len())
        .unwrap_or_else(|| (name_hash(&format!("{first_name}-{last_name}")) % THEMES.len() as u64) as usize)
}

pub fn theme_for(first_name: &str, last_name: &str) -> &'static Theme {
    &THEMES[theme_index(first_name, last_name)]
}

/// 31-multiplier string hash over UTF-16 code units. Only the shifted term is
/// truncated to 32 bits; the accumulator itself is carried unwrapped, so long
/// names can grow past the `i32` range.
fn name_hash(key: &str) -> u64 {
    key.encode_utf16()
        .fold(0i64, |hash, unit| {
            let shifted = i64::from((hash as i32).wrapping_shl(5));
            i64::from(unit) + shifted - hash
        })
        .unsigned_abs()
}
