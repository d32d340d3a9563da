use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::ValidationError;

/// Submission payload exactly as the quote form posts it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub company: CompanyInfo,
    pub client: ClientInfo,
    pub quote: QuoteMeta,
    #[serde(default)]
    pub tables: Vec<DepartmentSection>,
    #[serde(default)]
    pub cc_emails: Option<String>,
    /// Caller-computed grand total. Never re-derived from the line items.
    pub total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteMeta {
    #[serde(default, deserialize_with = "lenient_text")]
    pub number: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSection {
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub qty: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub total: String,
}

impl CompanyInfo {
    pub fn address_lines(&self) -> impl Iterator<Item = &str> {
        self.address.lines().map(str::trim).filter(|line| !line.is_empty())
    }
}

impl LineItem {
    /// Line total as a decimal; unparseable or blank text counts as zero.
    pub fn amount(&self) -> Decimal {
        parse_amount_or_zero(&self.total)
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_deref().map(str::trim).filter(|project| !project.is_empty())
    }
}

impl QuoteRequest {
    pub fn line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.tables.iter().flat_map(|section| section.line_items.iter())
    }

    pub fn line_item_sum(&self) -> Decimal {
        self.line_items().map(LineItem::amount).sum()
    }

    /// Whether the caller's `total` disagrees with the line items at cent precision.
    pub fn total_mismatch(&self) -> Option<Decimal> {
        let sum = round_cents(self.line_item_sum());
        let declared = round_cents(self.total);
        (sum != declared).then_some(sum)
    }
}

/// A `QuoteRequest` that passed boundary validation.
#[derive(Clone, Debug, PartialEq)]
pub struct QuoteSubmission {
    request: QuoteRequest,
}

impl QuoteSubmission {
    pub fn request(&self) -> &QuoteRequest {
        &self.request
    }

    pub fn reference(&self) -> &str {
        &self.request.quote.number
    }

    pub fn client_email(&self) -> &str {
        &self.request.client.email
    }

    pub fn attachment_filename(&self) -> String {
        format!("quote-{}.pdf", self.reference())
    }
}

impl TryFrom<QuoteRequest> for QuoteSubmission {
    type Error = ValidationError;

    fn try_from(mut request: QuoteRequest) -> Result<Self, Self::Error> {
        let number = request.quote.number.trim().to_string();
        if number.is_empty() {
            return Err(ValidationError::missing("quote.number"));
        }
        let forbidden = |ch: &char| matches!(*ch, '/' | '\\' | '"') || ch.is_control();
        if let Some(bad) = number.chars().find(forbidden) {
            return Err(ValidationError::invalid(
                "quote.number",
                format!("character {bad:?} is not allowed in a reference number"),
            ));
        }
        request.quote.number = number;

        if request.client.name.trim().is_empty() {
            return Err(ValidationError::missing("client.name"));
        }

        let client_email = request.client.email.trim().to_string();
        if client_email.is_empty() {
            return Err(ValidationError::missing("client.email"));
        }
        if !is_email_shaped(&client_email) {
            return Err(ValidationError::invalid("client.email", "not an email address"));
        }
        request.client.email = client_email;

        if request.tables.is_empty() {
            return Err(ValidationError::missing("tables"));
        }

        for (table_index, section) in request.tables.iter().enumerate() {
            for (item_index, item) in section.line_items.iter().enumerate() {
                let text = item.total.trim();
                if !text.is_empty() && parse_amount(text).is_none() {
                    return Err(ValidationError::invalid(
                        format!("tables[{table_index}].lineItems[{item_index}].total"),
                        format!("`{text}` is not a number"),
                    ));
                }
            }
        }

        if let Some(cc) = &request.cc_emails {
            if let Some(bad) = split_addresses(cc).find(|address| !is_email_shaped(address)) {
                return Err(ValidationError::invalid(
                    "ccEmails",
                    format!("`{bad}` is not an email address"),
                ));
            }
        }

        Ok(Self { request })
    }
}

/// Splits a comma-separated address list, dropping blank entries.
pub fn split_addresses(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|address| !address.is_empty())
}

pub fn is_email_shaped(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

pub fn parse_amount(text: &str) -> Option<Decimal> {
    Decimal::from_str(text.trim()).ok()
}

pub fn parse_amount_or_zero(text: &str) -> Decimal {
    parse_amount(text).unwrap_or(Decimal::ZERO)
}

/// Two fraction digits, half away from zero.
pub fn format_amount(value: Decimal) -> String {
    format!("{:.2}", round_cents(value))
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::Bool(flag) => flag.to_string(),
        other => {
            return Err(serde::de::Error::custom(format!("expected text or number, got {other}")))
        }
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{format_amount, parse_amount_or_zero, QuoteRequest, QuoteSubmission};
    use crate::errors::ValidationError;

    fn payload() -> serde_json::Value {
        json!({
            "company": {
                "address": "824 1/2 Main Street\nRochester, IN 46975",
                "phone": "844-775-4873",
                "email": "hello@splitroadmedia.com"
            },
            "client": {
                "name": "Acme Corp",
                "company": "Acme",
                "address": "1 Road",
                "phone": "555-0100",
                "email": " buyer@acme.test "
            },
            "quote": { "number": "ACM45900", "date": "10/19/2026" },
            "tables": [
                {
                    "department": "Video",
                    "lineItems": [
                        { "project": "Launch", "description": "Shoot\n• b-roll", "qty": "1", "total": "1200.5" },
                        { "description": "Edit", "qty": 2, "total": 300 }
                    ]
                }
            ],
            "ccEmails": "pm@acme.test",
            "total": 1500.5
        })
    }

    fn request() -> QuoteRequest {
        serde_json::from_value(payload()).expect("payload should deserialize")
    }

    #[test]
    fn deserializes_form_payload_with_numeric_fields() {
        let request = request();

        assert_eq!(request.tables[0].line_items.len(), 2);
        assert_eq!(request.tables[0].line_items[1].qty, "2");
        assert_eq!(request.tables[0].line_items[1].total, "300");
        assert_eq!(request.tables[0].line_items[0].project_name(), Some("Launch"));
        assert_eq!(request.tables[0].line_items[1].project_name(), None);
        assert_eq!(request.cc_emails.as_deref(), Some("pm@acme.test"));
        assert_eq!(request.total, Decimal::new(15005, 1));
    }

    #[test]
    fn validation_trims_reference_and_client_email() {
        let mut request = request();
        request.quote.number = "  ACM45900 ".to_string();

        let submission = QuoteSubmission::try_from(request).expect("valid payload");

        assert_eq!(submission.reference(), "ACM45900");
        assert_eq!(submission.client_email(), "buyer@acme.test");
        assert_eq!(submission.attachment_filename(), "quote-ACM45900.pdf");
    }

    #[test]
    fn validation_rejects_missing_reference_number() {
        let mut request = request();
        request.quote.number = "   ".to_string();

        let error = QuoteSubmission::try_from(request).expect_err("blank number must fail");
        assert_eq!(error, ValidationError::missing("quote.number"));
    }

    #[test]
    fn validation_rejects_path_characters_in_reference_number() {
        let mut request = request();
        request.quote.number = "../ACM".to_string();

        let error = QuoteSubmission::try_from(request).expect_err("slash must fail");
        assert_eq!(error.field(), "quote.number");
    }

    #[test]
    fn validation_rejects_missing_client_email() {
        let mut request = request();
        request.client.email = String::new();

        let error = QuoteSubmission::try_from(request).expect_err("missing email must fail");
        assert_eq!(error, ValidationError::missing("client.email"));
    }

    #[test]
    fn validation_rejects_empty_tables() {
        let mut request = request();
        request.tables.clear();

        let error = QuoteSubmission::try_from(request).expect_err("empty tables must fail");
        assert_eq!(error, ValidationError::missing("tables"));
    }

    #[test]
    fn validation_rejects_non_numeric_line_total_but_allows_blank() {
        let mut request = request();
        request.tables[0].line_items[1].total = String::new();
        assert!(QuoteSubmission::try_from(request.clone()).is_ok());

        request.tables[0].line_items[1].total = "twelve".to_string();
        let error = QuoteSubmission::try_from(request).expect_err("text total must fail");
        assert_eq!(error.field(), "tables[0].lineItems[1].total");
    }

    #[test]
    fn validation_rejects_malformed_cc_entry() {
        let mut request = request();
        request.cc_emails = Some("ok@acme.test, nope".to_string());

        let error = QuoteSubmission::try_from(request).expect_err("bad cc must fail");
        assert_eq!(error.field(), "ccEmails");
    }

    #[test]
    fn unparseable_amounts_default_to_zero() {
        assert_eq!(parse_amount_or_zero("abc"), Decimal::ZERO);
        assert_eq!(parse_amount_or_zero(""), Decimal::ZERO);
        assert_eq!(format_amount(parse_amount_or_zero("n/a")), "0.00");
        assert_eq!(format_amount(parse_amount_or_zero(" 12.345 ")), "12.35");
        assert_eq!(format_amount(Decimal::new(7, 0)), "7.00");
    }

    #[test]
    fn total_mismatch_is_reported_not_corrected() {
        let mut request = request();
        assert_eq!(request.total_mismatch(), None);

        request.total = Decimal::new(999, 0);
        assert_eq!(request.total_mismatch(), Some(Decimal::new(150050, 2)));
        assert_eq!(request.total, Decimal::new(999, 0));
    }
}
