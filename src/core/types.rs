use std::fmt;

use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Variable {
    LumpSum,
    MonthlyContribution,
    AccumulationYears,
}

impl Variable {
    pub const ALL: [Variable; 3] = [
        Variable::LumpSum,
        Variable::MonthlyContribution,
        Variable::AccumulationYears,
    ];
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::LumpSum => write!(f, "lump sum"),
            Variable::MonthlyContribution => write!(f, "monthly contribution"),
            Variable::AccumulationYears => write!(f, "accumulation years"),
        }
    }
}

/// How `desired_monthly_income_today` relates to the first withdrawal.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IncomeBasis {
    /// Income is in today's money and grows with inflation until retirement.
    #[default]
    TodaysMoney,
    /// Income is already the first withdrawal at the start of retirement.
    AtRetirement,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScenarioParameters {
    pub lump_sum: Option<f64>,
    pub monthly_contribution: Option<f64>,
    pub accumulation_years: Option<f64>,
    pub desired_monthly_income_today: f64,
    pub withdrawal_years: f64,
    pub inflation_rate: f64,
    pub annual_return: f64,
    pub capital_gains_tax_rate: f64,
    pub income_basis: IncomeBasis,
}

impl ScenarioParameters {
    pub fn value_of(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::LumpSum => self.lump_sum,
            Variable::MonthlyContribution => self.monthly_contribution,
            Variable::AccumulationYears => self.accumulation_years,
        }
    }

    pub fn with_value(mut self, variable: Variable, value: f64) -> Self {
        match variable {
            Variable::LumpSum => self.lump_sum = Some(value),
            Variable::MonthlyContribution => self.monthly_contribution = Some(value),
            Variable::AccumulationYears => self.accumulation_years = Some(value),
        }
        self
    }

    pub fn unknowns(&self) -> Vec<Variable> {
        Variable::ALL
            .into_iter()
            .filter(|v| self.value_of(*v).is_none())
            .collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct SweepRange {
    pub min: f64,
    pub max: f64,
}

impl SweepRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn values(self, points: usize) -> Vec<f64> {
        match points {
            0 => Vec::new(),
            1 => vec![f64::midpoint(self.min, self.max)],
            _ => {
                let step = (self.max - self.min) / (points - 1) as f64;
                (0..points)
                    .map(|i| {
                        if i == points - 1 {
                            self.max
                        } else {
                            self.min + step * i as f64
                        }
                    })
                    .collect()
            }
        }
    }
}

/// `None` picks the default pairing and ranges scaled to the desired income.
#[derive(Clone, Debug)]
pub struct SolveOptions {
    pub sweep: Option<Variable>,
    pub solve_for: Option<Variable>,
    pub curve_points: usize,
    pub grid_points: usize,
    pub lump_sum_range: Option<SweepRange>,
    pub monthly_contribution_range: Option<SweepRange>,
    pub accumulation_years_range: Option<SweepRange>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            sweep: None,
            solve_for: None,
            curve_points: 50,
            grid_points: 20,
            lump_sum_range: None,
            monthly_contribution_range: None,
            accumulation_years_range: None,
        }
    }
}

impl SolveOptions {
    pub fn range_for(&self, variable: Variable, income: f64) -> SweepRange {
        let explicit = match variable {
            Variable::LumpSum => self.lump_sum_range,
            Variable::MonthlyContribution => self.monthly_contribution_range,
            Variable::AccumulationYears => self.accumulation_years_range,
        };
        explicit.unwrap_or_else(|| match variable {
            Variable::LumpSum => SweepRange::new(0.0, income * 50.0),
            Variable::MonthlyContribution => SweepRange::new(100.0, (income * 4.0).max(100.0)),
            Variable::AccumulationYears => SweepRange::new(1.0, 30.0),
        })
    }
}

/// A solved scenario funds the withdrawals exactly, except when the given lump
/// sum and contribution already cover them at time zero: the years solve then
/// reports `accumulation_years == 0` with a positive `surplus()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedScenario {
    pub lump_sum: f64,
    pub monthly_contribution: f64,
    pub accumulation_years: f64,
    pub principal_contributed: f64,
    pub corpus_before_tax: f64,
    pub corpus_at_retirement: f64,
    pub first_withdrawal: f64,
    pub required_corpus: f64,
}

impl ResolvedScenario {
    pub fn value_of(&self, variable: Variable) -> f64 {
        match variable {
            Variable::LumpSum => self.lump_sum,
            Variable::MonthlyContribution => self.monthly_contribution,
            Variable::AccumulationYears => self.accumulation_years,
        }
    }

    pub fn surplus(&self) -> f64 {
        self.corpus_at_retirement - self.required_corpus
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePoint {
    pub sweep_value: f64,
    /// `None` when no root exists within the search bracket at this point.
    pub scenario: Option<ResolvedScenario>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOffCurve {
    pub sweep: Variable,
    pub solved_for: Variable,
    pub points: Vec<CurvePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOffSurface {
    pub x_axis: Variable,
    pub y_axis: Variable,
    pub solved_for: Variable,
    pub x_values: Vec<f64>,
    pub y_values: Vec<f64>,
    /// Row-major: `cells[y][x]`.
    pub cells: Vec<Vec<Option<ResolvedScenario>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveResult {
    Forward(ResolvedScenario),
    Single {
        solved_for: Variable,
        scenario: ResolvedScenario,
    },
    Curve(TradeOffCurve),
    Surface(TradeOffSurface),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ScenarioParameters {
        ScenarioParameters {
            lump_sum: Some(1.0),
            monthly_contribution: None,
            accumulation_years: None,
            desired_monthly_income_today: 1_000.0,
            withdrawal_years: 10.0,
            inflation_rate: 0.05,
            annual_return: 0.1,
            capital_gains_tax_rate: 0.1,
            income_basis: IncomeBasis::TodaysMoney,
        }
    }

    #[test]
    fn unknowns_follow_declaration_order() {
        assert_eq!(
            params().unknowns(),
            vec![Variable::MonthlyContribution, Variable::AccumulationYears]
        );
        let filled = params()
            .with_value(Variable::MonthlyContribution, 2.0)
            .with_value(Variable::AccumulationYears, 3.0);
        assert!(filled.unknowns().is_empty());
        assert_eq!(filled.value_of(Variable::AccumulationYears), Some(3.0));
    }

    #[test]
    fn sweep_range_includes_both_ends() {
        let values = SweepRange::new(0.0, 10.0).values(5);
        assert_eq!(values, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(SweepRange::new(2.0, 4.0).values(1), vec![3.0]);
        assert!(SweepRange::new(2.0, 4.0).values(0).is_empty());
    }

    #[test]
    fn default_ranges_scale_with_income() {
        let options = SolveOptions::default();
        assert_eq!(
            options.range_for(Variable::LumpSum, 8_000.0),
            SweepRange::new(0.0, 400_000.0)
        );
        assert_eq!(
            options.range_for(Variable::MonthlyContribution, 8_000.0),
            SweepRange::new(100.0, 32_000.0)
        );
        let overridden = SolveOptions {
            accumulation_years_range: Some(SweepRange::new(5.0, 15.0)),
            ..SolveOptions::default()
        };
        assert_eq!(
            overridden.range_for(Variable::AccumulationYears, 8_000.0),
            SweepRange::new(5.0, 15.0)
        );
    }
}
