use super::error::SolveError;
use super::types::{IncomeBasis, ResolvedScenario, ScenarioParameters};

const RATE_EPS: f64 = 1e-12;
const MONTHS_PER_YEAR: f64 = 12.0;

pub fn monthly_equivalent_rate(annual: f64) -> f64 {
    (1.0 + annual).powf(1.0 / MONTHS_PER_YEAR) - 1.0
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AccumulationFactors {
    pub periods: f64,
    pub growth: f64,
    pub annuity: f64,
}

impl AccumulationFactors {
    pub(crate) fn new(years: f64, annual_return: f64) -> Result<Self, SolveError> {
        ensure_finite("accumulation years", years)?;
        if years < 0.0 {
            return Err(SolveError::domain("accumulation years", "must be >= 0"));
        }
        ensure_rate("annual return", annual_return)?;

        let r = monthly_equivalent_rate(annual_return);
        let periods = years * MONTHS_PER_YEAR;
        let growth = (1.0 + r).powf(periods);
        let annuity = if r.abs() < RATE_EPS {
            periods
        } else {
            (growth - 1.0) / r
        };
        Ok(Self {
            periods,
            growth,
            annuity,
        })
    }

    pub(crate) fn future_value(self, lump_sum: f64, monthly_contribution: f64) -> f64 {
        lump_sum * self.growth + monthly_contribution * self.annuity
    }

    pub(crate) fn principal(self, lump_sum: f64, monthly_contribution: f64) -> f64 {
        lump_sum + monthly_contribution * self.periods
    }
}

pub fn accumulate(
    lump_sum: f64,
    monthly_contribution: f64,
    years: f64,
    annual_return: f64,
) -> Result<f64, SolveError> {
    ensure_finite("lump sum", lump_sum)?;
    ensure_finite("monthly contribution", monthly_contribution)?;
    let factors = AccumulationFactors::new(years, annual_return)?;
    Ok(factors.future_value(lump_sum, monthly_contribution))
}

pub fn principal_contributed(lump_sum: f64, monthly_contribution: f64, years: f64) -> f64 {
    lump_sum + monthly_contribution * years * MONTHS_PER_YEAR
}

/// One-off tax on the gain over principal. Losses earn no credit.
pub fn apply_capital_gains_tax(future_value: f64, principal: f64, tax_rate: f64) -> f64 {
    let gain = (future_value - principal).max(0.0);
    future_value - gain * tax_rate
}

/// Present value at the start of withdrawals of a monthly stream that begins at
/// `first_payment` and grows at the monthly-equivalent inflation rate.
pub fn required_corpus_for_withdrawals(
    first_payment: f64,
    inflation_rate: f64,
    withdrawal_years: f64,
    annual_return: f64,
) -> Result<f64, SolveError> {
    ensure_finite("first withdrawal", first_payment)?;
    ensure_finite("withdrawal years", withdrawal_years)?;
    if withdrawal_years <= 0.0 {
        return Err(SolveError::domain("withdrawal years", "must be > 0"));
    }
    ensure_rate("inflation rate", inflation_rate)?;
    ensure_rate("annual return", annual_return)?;

    let r = monthly_equivalent_rate(annual_return);
    let g = monthly_equivalent_rate(inflation_rate);
    let n = withdrawal_years * MONTHS_PER_YEAR;

    if (r - g).abs() < RATE_EPS {
        return Ok(first_payment * n / (1.0 + r));
    }
    let k = (1.0 + g) / (1.0 + r);
    Ok(first_payment * (1.0 - k.powf(n)) / (r - g))
}

pub fn first_withdrawal(params: &ScenarioParameters, accumulation_years: f64) -> f64 {
    match params.income_basis {
        IncomeBasis::TodaysMoney => {
            params.desired_monthly_income_today
                * (1.0 + params.inflation_rate).powf(accumulation_years)
        }
        IncomeBasis::AtRetirement => params.desired_monthly_income_today,
    }
}

pub fn corpus_at_retirement(
    params: &ScenarioParameters,
    lump_sum: f64,
    monthly_contribution: f64,
    years: f64,
) -> Result<f64, SolveError> {
    let future_value = accumulate(lump_sum, monthly_contribution, years, params.annual_return)?;
    Ok(apply_capital_gains_tax(
        future_value,
        principal_contributed(lump_sum, monthly_contribution, years),
        params.capital_gains_tax_rate,
    ))
}

pub(crate) fn required_corpus_at(params: &ScenarioParameters, years: f64) -> Result<f64, SolveError> {
    required_corpus_for_withdrawals(
        first_withdrawal(params, years),
        params.inflation_rate,
        params.withdrawal_years,
        params.annual_return,
    )
}

/// Post-tax corpus minus required corpus; zero when the plan exactly balances.
pub fn balance_gap(
    params: &ScenarioParameters,
    lump_sum: f64,
    monthly_contribution: f64,
    years: f64,
) -> Result<f64, SolveError> {
    Ok(corpus_at_retirement(params, lump_sum, monthly_contribution, years)?
        - required_corpus_at(params, years)?)
}

pub fn evaluate(
    params: &ScenarioParameters,
    lump_sum: f64,
    monthly_contribution: f64,
    years: f64,
) -> Result<ResolvedScenario, SolveError> {
    let corpus_before_tax = accumulate(lump_sum, monthly_contribution, years, params.annual_return)?;
    let principal = principal_contributed(lump_sum, monthly_contribution, years);
    let first = first_withdrawal(params, years);
    Ok(ResolvedScenario {
        lump_sum,
        monthly_contribution,
        accumulation_years: years,
        principal_contributed: principal,
        corpus_before_tax,
        corpus_at_retirement: apply_capital_gains_tax(
            corpus_before_tax,
            principal,
            params.capital_gains_tax_rate,
        ),
        first_withdrawal: first,
        required_corpus: required_corpus_for_withdrawals(
            first,
            params.inflation_rate,
            params.withdrawal_years,
            params.annual_return,
        )?,
    })
}

pub(crate) fn validate_parameters(params: &ScenarioParameters) -> Result<(), SolveError> {
    ensure_finite("desired monthly income", params.desired_monthly_income_today)?;
    if params.desired_monthly_income_today <= 0.0 {
        return Err(SolveError::domain("desired monthly income", "must be > 0"));
    }
    ensure_finite("withdrawal years", params.withdrawal_years)?;
    if params.withdrawal_years <= 0.0 {
        return Err(SolveError::domain("withdrawal years", "must be > 0"));
    }
    ensure_rate("inflation rate", params.inflation_rate)?;
    ensure_rate("annual return", params.annual_return)?;
    ensure_finite("capital gains tax rate", params.capital_gains_tax_rate)?;
    if !(0.0..1.0).contains(&params.capital_gains_tax_rate) {
        return Err(SolveError::domain(
            "capital gains tax rate",
            "must be in [0, 1)",
        ));
    }

    if let Some(lump_sum) = params.lump_sum {
        ensure_finite("lump sum", lump_sum)?;
        if lump_sum < 0.0 {
            return Err(SolveError::domain("lump sum", "must be >= 0"));
        }
    }
    if let Some(monthly) = params.monthly_contribution {
        ensure_finite("monthly contribution", monthly)?;
        if monthly < 0.0 {
            return Err(SolveError::domain("monthly contribution", "must be >= 0"));
        }
    }
    if let Some(years) = params.accumulation_years {
        ensure_finite("accumulation years", years)?;
        if years <= 0.0 {
            return Err(SolveError::domain("accumulation years", "must be > 0"));
        }
    }
    Ok(())
}

fn ensure_finite(field: &'static str, value: f64) -> Result<(), SolveError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SolveError::domain(field, "must be finite"))
    }
}

fn ensure_rate(field: &'static str, rate: f64) -> Result<(), SolveError> {
    ensure_finite(field, rate)?;
    if rate <= -1.0 {
        return Err(SolveError::domain(field, "must be > -100%"));
    }
    Ok(())
}
