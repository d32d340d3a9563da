use chrono::{Datelike, NaiveDate};
use serde::Serialize;

const PREFIX_CHARS: usize = 3;

/// Suggested reference number and display date for a new quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferenceSuggestion {
    pub number: String,
    pub date: String,
}

/// Builds `<first three letters of the client name, upper-cased><days since 1900-01-01>`.
///
/// Returns `None` for a blank client name. Uniqueness is not checked: two clients sharing a
/// prefix on the same day get the same number.
pub fn suggest_reference(client_name: &str, today: NaiveDate) -> Option<ReferenceSuggestion> {
    let name = client_name.trim();
    if name.is_empty() {
        return None;
    }

    let prefix: String = name.chars().take(PREFIX_CHARS).collect::<String>().to_uppercase();
    Some(ReferenceSuggestion {
        number: format!("{prefix}{}", days_since_1900(today)),
        date: format_quote_date(today),
    })
}

pub fn days_since_1900(today: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
    today.signed_duration_since(epoch).num_days()
}

/// US short form, `M/D/YYYY`.
pub fn format_quote_date(today: NaiveDate) -> String {
    format!("{}/{}/{}", today.month(), today.day(), today.year())
}
