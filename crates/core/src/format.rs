use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::dataset::Record;

pub const UNKNOWN: &str = "unknown";
pub const DEFAULT_CURRENCY_SUFFIX: &str = "Toman";
const SEPARATOR: &str = "---------------------------------";

/// What the user searched for; restated in the result header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchContext<'a> {
    pub building: &'a str,
    pub block: &'a str,
    pub term: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultFormatter {
    currency_suffix: String,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_CURRENCY_SUFFIX)
    }
}

impl ResultFormatter {
    pub fn new(currency_suffix: impl Into<String>) -> Self {
        Self { currency_suffix: currency_suffix.into() }
    }

    pub fn render(&self, context: &SearchContext<'_>, records: &[Record]) -> String {
        let mut output = format!(
            "Search results for:\nBuilding: {}\nBlock: {}\nSearch: {}\n\n",
            context.building, context.block, context.term
        );
        for record in records {
            output.push_str(&self.render_record(record));
        }
        output
    }

    fn render_record(&self, record: &Record) -> String {
        let amount = match record.amount_due {
            Some(amount) => format!("{} {}", group_thousands(amount), self.currency_suffix),
            None => UNKNOWN.to_owned(),
        };
        format!(
            "Name: {}\nFather: {}\nMobile: {}\nPhone: {}\nUnit/Floor: {}/{}\nAmount: {}\n\
             Modem: {}\n{SEPARATOR}\n",
            or_unknown(&record.full_name),
            optional(record.father_name.as_deref()),
            or_unknown(&record.mobile),
            optional(record.landline.as_deref()),
            or_unknown(&record.unit),
            or_unknown(&record.floor),
            amount,
            optional(record.modem_type.as_deref()),
        )
    }
}

fn optional(value: Option<&str>) -> &str {
    value.map(or_unknown).unwrap_or(UNKNOWN)
}

fn or_unknown(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN
    } else {
        trimmed
    }
}

/// Rounds to a whole number and groups digits by thousands: `1234567.6` → `1,234,568`.
pub fn group_thousands(amount: Decimal) -> String {
    let rounded = amount.round();
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let digits = match rounded.abs().to_u128() {
        Some(value) => value.to_string(),
        None => rounded.abs().trunc().to_string(),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if negative {
        grouped.insert(0, '-');
    }
    grouped
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{group_thousands, ResultFormatter, SearchContext};
    use crate::dataset::Record;

    fn ali() -> Record {
        Record {
            building: "A".to_owned(),
            block: "1".to_owned(),
            unit: "12".to_owned(),
            full_name: "Ali Rezaei".to_owned(),
            father_name: Some("Hassan".to_owned()),
            mobile: "9123456789".to_owned(),
            floor: "3".to_owned(),
            amount_due: Some(Decimal::new(500_000, 0)),
            ..Record::default()
        }
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(Decimal::new(500_000, 0)), "500,000");
        assert_eq!(group_thousands(Decimal::new(999, 0)), "999");
        assert_eq!(group_thousands(Decimal::new(12_345_675, 1)), "1,234,568");
        assert_eq!(group_thousands(Decimal::new(-1_000, 0)), "-1,000");
        assert_eq!(group_thousands(Decimal::ZERO), "0");
    }

    #[test]
    fn renders_header_and_record_fields() {
        let output = ResultFormatter::default().render(
            &SearchContext { building: "A", block: "1", term: "12" },
            &[ali()],
        );

        assert!(output.starts_with("Search results for:\nBuilding: A\nBlock: 1\nSearch: 12\n"));
        assert!(output.contains("Name: Ali Rezaei\nFather: Hassan\n"));
        assert!(output.contains("Mobile: 9123456789\nPhone: unknown\n"));
        assert!(output.contains("Unit/Floor: 12/3"));
        assert!(output.contains("Amount: 500,000 Toman"));
        assert!(output.contains("Modem: unknown"));
    }

    #[test]
    fn missing_fields_use_placeholder() {
        let record = Record { full_name: "Someone".to_owned(), ..Record::default() };
        let output = ResultFormatter::new("IRR").render(
            &SearchContext { building: "A", block: "1", term: "some" },
            &[record],
        );

        assert!(output.contains("Father: unknown"));
        assert!(output.contains("Mobile: unknown"));
        assert!(output.contains("Phone: unknown"));
        assert!(output.contains("Unit/Floor: unknown/unknown"));
        assert!(output.contains("Amount: unknown"));
    }

    #[test]
    fn landline_and_blank_father_render() {
        let record = Record {
            father_name: Some("  ".to_owned()),
            landline: Some("02188776655".to_owned()),
            ..ali()
        };
        let output = ResultFormatter::default().render(
            &SearchContext { building: "A", block: "1", term: "12" },
            &[record],
        );

        assert!(output.contains("Father: unknown\n"));
        assert!(output.contains("Phone: 02188776655\n"));
    }

    #[test]
    fn records_keep_their_order() {
        let mut second = ali();
        second.full_name = "Ali Karimi".to_owned();
        let output = ResultFormatter::default().render(
            &SearchContext { building: "A", block: "1", term: "ali" },
            &[ali(), second],
        );

        let first_at = output.find("Ali Rezaei").expect("first record");
        let second_at = output.find("Ali Karimi").expect("second record");
        assert!(first_at < second_at);
    }
}
