use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A spreadsheet cell as it arrives from a loader, before any coercion.
#[derive(Clone, Debug, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
}

impl RawCell {
    pub fn from_text(value: &str) -> Self {
        if value.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(value.to_owned())
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Number(value) => value.is_nan(),
        }
    }

    /// Stringifies the cell the way a spreadsheet export would, trimmed.
    pub fn render(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(text) => text.trim().to_owned(),
            Self::Number(value) if value.is_nan() => String::new(),
            Self::Number(value) => value.to_string(),
        }
    }
}

/// One textual rewrite applied to phone values before digits are extracted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid phone rewrite pattern `{pattern}`: {source}")]
    InvalidPattern { pattern: String, source: regex::Error },
}

pub fn default_phone_rewrites() -> Vec<RewriteRule> {
    vec![RewriteRule { pattern: "9.12".to_owned(), replacement: "912".to_owned() }]
}

#[derive(Clone, Debug)]
pub struct FieldNormalizer {
    phone_rewrites: Vec<(Regex, String)>,
    trailing_zero: Regex,
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        // The default rule set is a compile-time constant and always valid.
        let phone_rewrites = default_phone_rewrites()
            .into_iter()
            .filter_map(|rule| Regex::new(&rule.pattern).ok().map(|re| (re, rule.replacement)))
            .collect();
        Self { phone_rewrites, trailing_zero: trailing_zero_regex() }
    }
}

fn trailing_zero_regex() -> Regex {
    Regex::new(r"\.0$").unwrap_or_else(|_| unreachable!("static pattern"))
}

impl FieldNormalizer {
    pub fn with_rules(rules: &[RewriteRule]) -> Result<Self, NormalizeError> {
        let phone_rewrites = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.replacement.clone()))
                    .map_err(|source| NormalizeError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { phone_rewrites, trailing_zero: trailing_zero_regex() })
    }

    /// Canonical digit-only phone, falling back to `secondary` when `primary` is blank.
    ///
    /// Each rewrite rule runs exactly once over the value. Values with no digits at all
    /// pass through trimmed.
    pub fn normalize_phone(&self, primary: &RawCell, secondary: &RawCell) -> String {
        let source = if primary.is_blank() { secondary } else { primary };
        let raw = match source {
            RawCell::Number(value) if value.is_finite() && value.fract() == 0.0 => {
                format!("{value:.0}")
            }
            other => other.render(),
        };
        if raw.is_empty() {
            return raw;
        }

        let mut value = expand_scientific(&raw).unwrap_or(raw);
        for (pattern, replacement) in &self.phone_rewrites {
            value = pattern.replace_all(&value, replacement.as_str()).into_owned();
        }
        value = self.trailing_zero.replace(&value, "").into_owned();

        let digits: String =
            normalize_digits(&value).chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            value.trim().to_owned()
        } else {
            digits
        }
    }
}

/// Trims an identifier and folds integral float renderings (`12.0`) into integers.
pub fn normalize_identifier(raw: &RawCell) -> String {
    match raw {
        RawCell::Number(value) if value.is_finite() && value.fract() == 0.0 => {
            format!("{value:.0}")
        }
        other => {
            let text = normalize_digits(&other.render());
            match text.strip_suffix(".0") {
                Some(head) if !head.is_empty() && head.chars().all(|ch| ch.is_ascii_digit()) => {
                    head.to_owned()
                }
                _ => text,
            }
        }
    }
}

/// `building_block_unit`, blank components become empty strings.
pub fn composite_key(building: &str, block: &str, unit: &str) -> String {
    format!("{}_{}_{}", building.trim(), block.trim(), unit.trim())
}

/// Maps Persian and Arabic-Indic digits to their ASCII forms.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (ch as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (ch as u32 - 0x0660) as u8),
            other => other,
        })
        .collect()
}

fn expand_scientific(raw: &str) -> Option<String> {
    if !raw.contains(['e', 'E']) {
        return None;
    }
    let value = raw.trim().parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0 && value >= 0.0).then(|| format!("{value:.0}"))
}
