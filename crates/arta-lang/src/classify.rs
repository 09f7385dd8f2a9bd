use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::digits::{extract_amounts, normalize_digits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Intent resolved from an inbound message.
pub enum QueryKind {
    IncomeTax,
    ValueAddedTax,
    SalaryTax,
    BusinessTax,
    GeneralQuestion,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncomeTax => "income_tax",
            Self::ValueAddedTax => "value_added_tax",
            Self::SalaryTax => "salary_tax",
            Self::BusinessTax => "business_tax",
            Self::GeneralQuestion => "general_question",
        }
    }

    /// True when the intent carries an amount the tax engine can compute on.
    pub fn is_calculation(&self) -> bool {
        !matches!(self, Self::GeneralQuestion)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Classification outcome for one inbound message.
pub struct QueryAnalysis {
    pub kind: QueryKind,
    pub amount: Option<u64>,
    pub confidence: f64,
}

struct IntentPattern {
    kind: QueryKind,
    pattern: &'static str,
}

// Ordered: the first matching pattern wins, so the amount-bearing intents are
// checked before the generic question keywords.
const INTENT_PATTERNS: [IntentPattern; 5] = [
    IntentPattern {
        kind: QueryKind::IncomeTax,
        pattern: r"مالیات\s*(?:درآمد)?\s*(\d+)",
    },
    IntentPattern {
        kind: QueryKind::ValueAddedTax,
        pattern: r"مالیات\s*(?:بر\s*)?ارزش\s*افزوده\s*(\d+)",
    },
    IntentPattern {
        kind: QueryKind::SalaryTax,
        pattern: r"مالیات\s*حقوق\s*(\d+)",
    },
    IntentPattern {
        kind: QueryKind::BusinessTax,
        pattern: r"مالیات\s*(?:کسب\s*و\s*کار|شرکت)\s*(\d+)",
    },
    IntentPattern {
        kind: QueryKind::GeneralQuestion,
        pattern: r"چطور|چگونه|راهنمایی|کمک|سوال",
    },
];

fn compiled_patterns() -> &'static Vec<(QueryKind, Regex)> {
    static PATTERNS: OnceLock<Vec<(QueryKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        INTENT_PATTERNS
            .iter()
            .filter_map(|intent| {
                Regex::new(intent.pattern)
                    .ok()
                    .map(|regex| (intent.kind, regex))
            })
            .collect()
    })
}

/// Classifies message text into a tax-query intent, normalizing Persian and
/// Arabic digits before amount extraction.
pub fn analyze_query(text: &str) -> QueryAnalysis {
    let normalized = normalize_digits(text);
    let amounts = extract_amounts(&normalized);

    for (kind, regex) in compiled_patterns() {
        let Some(captures) = regex.captures(&normalized) else {
            continue;
        };
        let captured_amount = captures
            .get(1)
            .and_then(|group| group.as_str().parse::<u64>().ok());
        return QueryAnalysis {
            kind: *kind,
            amount: captured_amount.or_else(|| amounts.first().copied()),
            confidence: 0.9,
        };
    }

    // A bare number with no recognizable phrasing is still most likely an
    // income-tax request, just a lower-confidence one.
    if let Some(first) = amounts.first() {
        return QueryAnalysis {
            kind: QueryKind::IncomeTax,
            amount: Some(*first),
            confidence: 0.6,
        };
    }

    QueryAnalysis {
        kind: QueryKind::GeneralQuestion,
        amount: None,
        confidence: 0.8,
    }
}
