//! Iranian income-tax arithmetic for tax year 1403.
//!
//! Pure functions over rial amounts: progressive income brackets, personal
//! exemptions, salary/corporate/VAT variants, and a formatted Persian report.
//! All arithmetic is integer rials; rates are whole percentages.

mod brackets;
mod report;

pub use brackets::{
    calculate_corporate_tax, calculate_income_tax, calculate_salary_tax, calculate_tax,
    calculate_vat, marginal_rate_percent, BracketShare, CompanyType, CorporateTaxComputation,
    ExemptionDetail, SalaryTaxComputation, TaxComputation, TaxError, TaxOptions, TaxSummary,
    VatComputation, TAX_YEAR,
};
pub use report::income_tax_report;
