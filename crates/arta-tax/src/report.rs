use arta_lang::{convert_to_persian_digits, format_persian_number};

use crate::brackets::{calculate_income_tax, TaxError, TaxOptions};

/// Renders the full Persian tax report for a yearly income.
pub fn income_tax_report(income: u64, options: &TaxOptions) -> Result<String, TaxError> {
    let computation = calculate_income_tax(income, options)?;

    let mut report = String::from("📊 گزارش محاسبه مالیات\n\n");
    report.push_str(&format!(
        "💰 درآمد ناخالص: {} ریال\n",
        format_persian_number(computation.gross_income)
    ));
    report.push_str(&format!(
        "🎯 کل معافیت‌ها: {} ریال\n",
        format_persian_number(computation.total_exemptions)
    ));
    report.push_str(&format!(
        "📈 درآمد مشمول: {} ریال\n",
        format_persian_number(computation.taxable_income)
    ));
    report.push_str(&format!(
        "🧮 مالیات محاسبه شده: {} ریال\n",
        format_persian_number(computation.total_tax)
    ));
    report.push_str(&format!(
        "💵 درآمد خالص: {} ریال\n",
        format_persian_number(computation.net_income)
    ));
    report.push_str(&format!(
        "📊 نرخ مؤثر: {:.2}%\n",
        computation.effective_rate_percent
    ));
    report.push_str(&format!(
        "🎚️ نرخ نهایی: {}%\n\n",
        computation.marginal_rate_percent
    ));

    if !computation.breakdown.is_empty() {
        report.push_str("📋 جزئیات محاسبه:\n");
        for (index, share) in computation.breakdown.iter().enumerate() {
            let upper = share
                .upper
                .map(format_persian_number)
                .unwrap_or_else(|| "بالاتر".to_string());
            report.push_str(&format!(
                "{}. {} تا {}: {} ریال ({}%)\n",
                index + 1,
                format_persian_number(share.lower),
                upper,
                format_persian_number(share.tax_amount),
                share.rate_percent
            ));
        }
        report.push('\n');
    }

    report.push_str("🏷️ جزئیات معافیت‌ها:\n");
    report.push_str(&format!(
        "• معافیت شخصی: {} ریال\n",
        format_persian_number(computation.exemptions.personal)
    ));
    if computation.exemptions.spouse > 0 {
        report.push_str(&format!(
            "• معافیت همسر: {} ریال\n",
            format_persian_number(computation.exemptions.spouse)
        ));
    }
    if computation.exemptions.children > 0 {
        report.push_str(&format!(
            "• معافیت فرزندان: {} ریال\n",
            format_persian_number(computation.exemptions.children)
        ));
    }
    if computation.exemptions.elderly > 0 {
        report.push_str(&format!(
            "• معافیت سالمندی: {} ریال\n",
            format_persian_number(computation.exemptions.elderly)
        ));
    }
    if computation.exemptions.disability > 0 {
        report.push_str(&format!(
            "• معافیت معلولیت: {} ریال\n",
            format_persian_number(computation.exemptions.disability)
        ));
    }

    report.push_str("\n⚠️ توجه: این محاسبه بر اساس نرخ‌های سال ۱۴۰۳ و صرفاً جهت اطلاع است.");

    Ok(convert_to_persian_digits(&report))
}
