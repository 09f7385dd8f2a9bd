#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Script detected in inbound text.
pub enum Language {
    Persian,
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persian => "fa",
            Self::English => "en",
        }
    }
}

/// Detects the message script from the presence of Arabic-block codepoints.
pub fn detect_language(text: &str) -> Language {
    if text.chars().any(|ch| ('\u{0600}'..='\u{06FF}').contains(&ch)) {
        Language::Persian
    } else {
        Language::English
    }
}

const QUICK_RESPONSES: [(&str, &str); 4] = [
    ("سلام", "سلام! چطور می‌تونم کمکتون کنم؟"),
    ("ممنون", "خواهش می‌کنم! اگر سوال دیگه‌ای دارید، بپرسید."),
    (
        "راهنمایی",
        "برای محاسبه مالیات، درآمدتون رو بنویسید. مثل: \"مالیات ۱۰۰۰۰۰۰۰\"",
    ),
    ("کمک", "چطور می‌تونم کمکتون کنم؟ می‌تونید سوال مالیاتی‌تون رو بپرسید."),
];

/// Returns the canned reply for common greetings and short requests, if any.
pub fn quick_response(text: &str) -> Option<&'static str> {
    let lowered = text.trim().to_lowercase();
    QUICK_RESPONSES
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, response)| *response)
}

/// True when the text contains a blocklisted term. The blocklist is supplied
/// by configuration so deployments can tune it without a rebuild.
pub fn contains_inappropriate_content(text: &str, blocklist: &[String]) -> bool {
    if blocklist.is_empty() {
        return false;
    }
    let lowered = text.to_lowercase();
    blocklist
        .iter()
        .any(|word| !word.trim().is_empty() && lowered.contains(&word.trim().to_lowercase()))
}

/// First-contact greeting listing the bot's capabilities.
pub fn welcome_message() -> String {
    "سلام!\n\n🤖 من دستیار مالیاتی هوشمند شما هستم.\n\n📊 قابلیت‌های من:\n• محاسبه مالیات درآمد\n• پاسخ به سوالات مالیاتی\n• راهنمایی در مورد قوانین مالیاتی\n\n💡 نحوه استفاده:\n• برای محاسبه مالیات: \"مالیات ۱۰۰۰۰۰۰۰\"\n• برای سوال: مستقیماً سوالتان را بپرسید\n\n🔍 مثال: \"مالیات حقوق ۵۰ میلیون چقدر است؟\"".to_string()
}

/// Usage guide sent in response to the help keywords.
pub fn help_message() -> String {
    "📚 راهنمای استفاده از ربات مالیاتی:\n\n🔢 محاسبه مالیات:\n• \"مالیات ۱۰۰۰۰۰۰۰\" - محاسبه مالیات درآمد\n• \"مالیات حقوق ۵۰۰۰۰۰۰۰\" - محاسبه مالیات حقوق\n• \"مالیات شرکت ۲۰۰۰۰۰۰۰۰\" - محاسبه مالیات شرکت\n\n❓ سوالات عمومی:\n• \"چطور مالیات محاسبه می‌شود؟\"\n• \"معافیت مالیاتی چیست؟\"\n\n⚡ نکات مهم:\n• پاسخ‌ها بر اساس آخرین قوانین مالیاتی ایران\n• برای دقت بیشتر با مشاور مالیاتی مشورت کنید".to_string()
}
