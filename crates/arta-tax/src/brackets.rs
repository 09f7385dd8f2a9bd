use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tax year the bracket table below is drawn from.
pub const TAX_YEAR: u32 = 1403;

#[derive(Debug, Error, PartialEq, Eq)]
/// Input errors raised by the calculators.
pub enum TaxError {
    #[error("income must be a positive amount")]
    InvalidIncome,
}

struct Bracket {
    lower: u64,
    upper: Option<u64>,
    rate_percent: u64,
}

const BRACKETS_1403: [Bracket; 4] = [
    Bracket {
        lower: 0,
        upper: Some(5_000_000),
        rate_percent: 0,
    },
    Bracket {
        lower: 5_000_000,
        upper: Some(10_000_000),
        rate_percent: 10,
    },
    Bracket {
        lower: 10_000_000,
        upper: Some(20_000_000),
        rate_percent: 20,
    },
    Bracket {
        lower: 20_000_000,
        upper: None,
        rate_percent: 30,
    },
];

const PERSONAL_EXEMPTION: u64 = 5_000_000;
const SPOUSE_EXEMPTION: u64 = 2_000_000;
const CHILD_EXEMPTION: u64 = 1_000_000;
const ELDERLY_EXEMPTION: u64 = 1_500_000;
const DISABILITY_EXEMPTION: u64 = 3_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Household circumstances that widen the exemption band.
pub struct TaxOptions {
    pub has_spouse: bool,
    pub children_count: u32,
    pub is_elderly: bool,
    pub has_disability: bool,
    pub additional_exemptions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One bracket's contribution to the total tax.
pub struct BracketShare {
    pub lower: u64,
    pub upper: Option<u64>,
    pub rate_percent: u64,
    pub taxable_amount: u64,
    pub tax_amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Per-category exemption amounts applied to a computation.
pub struct ExemptionDetail {
    pub personal: u64,
    pub spouse: u64,
    pub children: u64,
    pub elderly: u64,
    pub disability: u64,
    pub additional: u64,
}

impl ExemptionDetail {
    pub fn total(&self) -> u64 {
        self.personal
            .saturating_add(self.spouse)
            .saturating_add(self.children)
            .saturating_add(self.elderly)
            .saturating_add(self.disability)
            .saturating_add(self.additional)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Full progressive income-tax computation.
pub struct TaxComputation {
    pub gross_income: u64,
    pub total_exemptions: u64,
    pub taxable_income: u64,
    pub total_tax: u64,
    pub net_income: u64,
    pub effective_rate_percent: f64,
    pub marginal_rate_percent: u64,
    pub breakdown: Vec<BracketShare>,
    pub exemptions: ExemptionDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Condensed result for one-line replies.
pub struct TaxSummary {
    pub gross_income: u64,
    pub total_tax: u64,
    pub net_income: u64,
}

/// Computes progressive income tax for a yearly income.
pub fn calculate_income_tax(income: u64, options: &TaxOptions) -> Result<TaxComputation, TaxError> {
    if income == 0 {
        return Err(TaxError::InvalidIncome);
    }

    let exemptions = ExemptionDetail {
        personal: PERSONAL_EXEMPTION,
        spouse: if options.has_spouse { SPOUSE_EXEMPTION } else { 0 },
        children: u64::from(options.children_count).saturating_mul(CHILD_EXEMPTION),
        elderly: if options.is_elderly { ELDERLY_EXEMPTION } else { 0 },
        disability: if options.has_disability {
            DISABILITY_EXEMPTION
        } else {
            0
        },
        additional: options.additional_exemptions,
    };
    let total_exemptions = exemptions.total();
    let taxable_income = income.saturating_sub(total_exemptions);

    let mut total_tax = 0_u64;
    let mut breakdown = Vec::new();
    for bracket in &BRACKETS_1403 {
        if taxable_income <= bracket.lower {
            continue;
        }
        let bracket_width = bracket
            .upper
            .map(|upper| upper.saturating_sub(bracket.lower))
            .unwrap_or(u64::MAX);
        let taxable_in_bracket = taxable_income
            .saturating_sub(bracket.lower)
            .min(bracket_width);
        let tax_in_bracket = taxable_in_bracket
            .saturating_mul(bracket.rate_percent)
            .saturating_div(100);
        total_tax = total_tax.saturating_add(tax_in_bracket);

        if tax_in_bracket > 0 {
            breakdown.push(BracketShare {
                lower: bracket.lower,
                upper: bracket.upper,
                rate_percent: bracket.rate_percent,
                taxable_amount: taxable_in_bracket,
                tax_amount: tax_in_bracket,
            });
        }
    }

    let effective_rate_percent = if taxable_income > 0 {
        (total_tax as f64 / taxable_income as f64) * 100.0
    } else {
        0.0
    };

    Ok(TaxComputation {
        gross_income: income,
        total_exemptions,
        taxable_income,
        total_tax,
        net_income: income.saturating_sub(total_tax),
        effective_rate_percent,
        marginal_rate_percent: marginal_rate_percent(taxable_income),
        breakdown,
        exemptions,
    })
}

/// Rate of the bracket a marginal rial of taxable income would fall into.
pub fn marginal_rate_percent(taxable_income: u64) -> u64 {
    for bracket in &BRACKETS_1403 {
        let within_upper = bracket.upper.map(|upper| taxable_income < upper).unwrap_or(true);
        if taxable_income >= bracket.lower && within_upper {
            return bracket.rate_percent;
        }
    }
    30
}

/// Condensed income-tax result with default household options.
pub fn calculate_tax(income: u64) -> Result<TaxSummary, TaxError> {
    let computation = calculate_income_tax(income, &TaxOptions::default())?;
    Ok(TaxSummary {
        gross_income: computation.gross_income,
        total_tax: computation.total_tax,
        net_income: computation.net_income,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Monthly salary tax derived from the annualized computation.
pub struct SalaryTaxComputation {
    pub monthly_salary: u64,
    pub monthly_tax: u64,
    pub monthly_net: u64,
    pub annual: TaxComputation,
}

/// Computes tax for a monthly salary by annualizing it.
pub fn calculate_salary_tax(
    monthly_salary: u64,
    options: &TaxOptions,
) -> Result<SalaryTaxComputation, TaxError> {
    let annual_salary = monthly_salary.saturating_mul(12);
    let annual = calculate_income_tax(annual_salary, options)?;
    let monthly_tax = annual.total_tax / 12;
    Ok(SalaryTaxComputation {
        monthly_salary,
        monthly_tax,
        monthly_net: monthly_salary.saturating_sub(monthly_tax),
        annual,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Company classes with distinct flat corporate rates.
pub enum CompanyType {
    General,
    Small,
    Startup,
    Cooperative,
}

impl CompanyType {
    pub fn rate_percent(&self) -> u64 {
        match self {
            Self::General => 25,
            Self::Small => 20,
            Self::Startup => 10,
            Self::Cooperative => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Flat-rate corporate tax result.
pub struct CorporateTaxComputation {
    pub profit: u64,
    pub rate_percent: u64,
    pub tax: u64,
    pub net_profit: u64,
    pub company_type: CompanyType,
}

/// Computes flat-rate corporate tax on profit.
pub fn calculate_corporate_tax(
    profit: u64,
    company_type: CompanyType,
) -> Result<CorporateTaxComputation, TaxError> {
    if profit == 0 {
        return Err(TaxError::InvalidIncome);
    }
    let rate_percent = company_type.rate_percent();
    let tax = profit.saturating_mul(rate_percent).saturating_div(100);
    Ok(CorporateTaxComputation {
        profit,
        rate_percent,
        tax,
        net_profit: profit.saturating_sub(tax),
        company_type,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Value-added tax result.
pub struct VatComputation {
    pub base_amount: u64,
    pub rate_percent: u64,
    pub vat_amount: u64,
    pub total_amount: u64,
}

/// Computes VAT at the standard 9% rate unless overridden.
pub fn calculate_vat(amount: u64, rate_percent: Option<u64>) -> Result<VatComputation, TaxError> {
    if amount == 0 {
        return Err(TaxError::InvalidIncome);
    }
    let rate_percent = rate_percent.unwrap_or(9);
    let vat_amount = amount.saturating_mul(rate_percent).saturating_div(100);
    Ok(VatComputation {
        base_amount: amount,
        rate_percent,
        vat_amount,
        total_amount: amount.saturating_add(vat_amount),
    })
}
