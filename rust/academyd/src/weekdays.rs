//! Class meeting days: the editor's Korean checkbox labels, the canonical
//! English names on the wire, and the comma-joined column they are stored in.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Monday => "MONDAY",
            Self::Tuesday => "TUESDAY",
            Self::Wednesday => "WEDNESDAY",
            Self::Thursday => "THURSDAY",
            Self::Friday => "FRIDAY",
            Self::Saturday => "SATURDAY",
            Self::Sunday => "SUNDAY",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Monday => "월",
            Self::Tuesday => "화",
            Self::Wednesday => "수",
            Self::Thursday => "목",
            Self::Friday => "금",
            Self::Saturday => "토",
            Self::Sunday => "일",
        }
    }

    /// Accepts the canonical name (any case) or the Korean label.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s) || d.label() == s)
    }
}

/// Parses a `daysOfWeek` list, keeping caller order and dropping repeats.
pub fn parse_days(values: &[serde_json::Value]) -> Result<Vec<Weekday>, String> {
    let mut out: Vec<Weekday> = Vec::with_capacity(values.len());
    for v in values {
        let s = v
            .as_str()
            .ok_or_else(|| "daysOfWeek must be an array of strings".to_string())?;
        let day = Weekday::parse(s).ok_or_else(|| format!("unknown day of week: {}", s))?;
        if !out.contains(&day) {
            out.push(day);
        }
    }
    Ok(out)
}

pub fn join_days(days: &[Weekday]) -> String {
    days.iter()
        .map(|d| d.name())
        .collect::<Vec<_>>()
        .join(",")
}

/// Reads the stored column. Entries that no longer parse are dropped.
pub fn split_days(stored: Option<&str>) -> Vec<&'static str> {
    stored
        .unwrap_or("")
        .split(',')
        .filter_map(Weekday::parse)
        .map(Weekday::name)
        .collect()
}
