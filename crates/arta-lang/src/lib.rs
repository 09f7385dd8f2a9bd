//! Language helpers for inbound Persian tax queries.
//!
//! Classifies free-form message text into tax-query intents, extracts
//! amounts, and renders the canned Persian responses used by the dispatcher.

mod classify;
mod digits;
mod messages;
mod sentiment;

pub use classify::{analyze_query, QueryAnalysis, QueryKind};
pub use digits::{
    convert_to_persian_digits, extract_amounts, format_persian_number, normalize_digits,
};
pub use messages::{
    contains_inappropriate_content, detect_language, help_message, quick_response,
    welcome_message, Language,
};
pub use sentiment::{analyze_sentiment, Sentiment};
