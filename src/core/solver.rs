#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, warn};

use super::engine::{
    AccumulationFactors, balance_gap, evaluate, required_corpus_at, validate_parameters,
};
use super::error::SolveError;
use super::roots::{Bisection, Bracket, RootError, RootFinder, scan_for_sign_change};
use super::types::{
    CurvePoint, ResolvedScenario, ScenarioParameters, SolveOptions, SolveResult, SweepRange,
    TradeOffCurve, TradeOffSurface, Variable,
};

const YEAR_SEARCH_CAP: f64 = 100.0;
const YEAR_SCAN_STEP: f64 = 1.0 / 12.0;
const CURRENCY_BRACKET_SCALE: f64 = 1_000.0;

pub const MAX_CURVE_POINTS: usize = 1_000;
pub const MAX_GRID_POINTS: usize = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SolveMode {
    Forward,
    Single(Variable),
    Curve {
        sweep: Variable,
        solve_for: Variable,
    },
    Surface {
        x_axis: Variable,
        y_axis: Variable,
        solve_for: Variable,
    },
}

impl SolveMode {
    pub fn classify(
        params: &ScenarioParameters,
        options: &SolveOptions,
    ) -> Result<Self, SolveError> {
        let unknowns = params.unknowns();
        match unknowns.as_slice() {
            [] => {
                reject_sweep(options, "all fields are given")?;
                reject_solve_for(options, "all fields are given")?;
                Ok(SolveMode::Forward)
            }
            [variable] => {
                reject_sweep(options, "only one field is unknown")?;
                reject_solve_for(options, "only one field is unknown")?;
                Ok(SolveMode::Single(*variable))
            }
            [first, second] => {
                reject_solve_for(options, "two fields are unknown; choose a sweep instead")?;
                let sweep = match options.sweep {
                    Some(v) if v == *first || v == *second => v,
                    Some(v) => {
                        return Err(SolveError::AmbiguousUnknowns(format!(
                            "cannot sweep {v}: it is already given"
                        )));
                    }
                    None => *first,
                };
                let solve_for = if sweep == *first { *second } else { *first };
                Ok(SolveMode::Curve { sweep, solve_for })
            }
            [_, _, _] => {
                reject_sweep(options, "all fields are unknown; choose solve_for instead")?;
                let solve_for = options.solve_for.unwrap_or(Variable::LumpSum);
                let mut axes = Variable::ALL.into_iter().filter(|v| *v != solve_for);
                match (axes.next(), axes.next()) {
                    (Some(x_axis), Some(y_axis)) => Ok(SolveMode::Surface {
                        x_axis,
                        y_axis,
                        solve_for,
                    }),
                    _ => Err(SolveError::AmbiguousUnknowns(
                        "surface needs two sweep axes".to_string(),
                    )),
                }
            }
            other => Err(SolveError::AmbiguousUnknowns(format!(
                "{} unknown fields; expected 0 to 3",
                other.len()
            ))),
        }
    }
}

fn reject_sweep(options: &SolveOptions, why: &str) -> Result<(), SolveError> {
    match options.sweep {
        Some(v) => Err(SolveError::AmbiguousUnknowns(format!(
            "cannot sweep {v}: {why}"
        ))),
        None => Ok(()),
    }
}

fn reject_solve_for(options: &SolveOptions, why: &str) -> Result<(), SolveError> {
    match options.solve_for {
        Some(v) => Err(SolveError::AmbiguousUnknowns(format!(
            "cannot solve for {v} across a surface: {why}"
        ))),
        None => Ok(()),
    }
}

/// Solves whichever fields are open. Single solves balance the goal exactly
/// unless the plan is already funded at time zero, which yields zero years and
/// a surplus.
pub fn solve(params: &ScenarioParameters) -> Result<SolveResult, SolveError> {
    solve_with(params, &SolveOptions::default())
}

pub fn solve_with(
    params: &ScenarioParameters,
    options: &SolveOptions,
) -> Result<SolveResult, SolveError> {
    validate_parameters(params)?;
    validate_options(options)?;

    let mode = SolveMode::classify(params, options)?;
    debug!(?mode, "solving scenario");

    match mode {
        SolveMode::Forward => {
            let scenario = evaluate(
                params,
                known(params, Variable::LumpSum)?,
                known(params, Variable::MonthlyContribution)?,
                known(params, Variable::AccumulationYears)?,
            )?;
            Ok(SolveResult::Forward(scenario))
        }
        SolveMode::Single(variable) => Ok(SolveResult::Single {
            solved_for: variable,
            scenario: resolve(params, variable)?,
        }),
        SolveMode::Curve { sweep, solve_for } => Ok(SolveResult::Curve(trade_off_curve(
            params, options, sweep, solve_for,
        )?)),
        SolveMode::Surface {
            x_axis,
            y_axis,
            solve_for,
        } => Ok(SolveResult::Surface(trade_off_surface(
            params, options, x_axis, y_axis, solve_for,
        )?)),
    }
}

pub fn solve_single(
    params: &ScenarioParameters,
    variable: Variable,
) -> Result<ResolvedScenario, SolveError> {
    validate_parameters(params)?;
    let others: Vec<Variable> = params
        .unknowns()
        .into_iter()
        .filter(|v| *v != variable)
        .collect();
    if !others.is_empty() {
        return Err(SolveError::AmbiguousUnknowns(format!(
            "solving for {variable} needs every other field given"
        )));
    }
    resolve(params, variable)
}

fn validate_options(options: &SolveOptions) -> Result<(), SolveError> {
    if !(1..=MAX_CURVE_POINTS).contains(&options.curve_points) {
        return Err(SolveError::domain(
            "curve points",
            format!("must be between 1 and {MAX_CURVE_POINTS}"),
        ));
    }
    if !(1..=MAX_GRID_POINTS).contains(&options.grid_points) {
        return Err(SolveError::domain(
            "grid points",
            format!("must be between 1 and {MAX_GRID_POINTS}"),
        ));
    }
    for (field, range) in [
        ("lump sum range", options.lump_sum_range),
        ("monthly contribution range", options.monthly_contribution_range),
        ("accumulation years range", options.accumulation_years_range),
    ] {
        if let Some(range) = range {
            validate_range(field, range)?;
        }
    }
    Ok(())
}

fn validate_range(field: &'static str, range: SweepRange) -> Result<(), SolveError> {
    if !range.min.is_finite() || !range.max.is_finite() {
        return Err(SolveError::domain(field, "bounds must be finite"));
    }
    if range.min < 0.0 {
        return Err(SolveError::domain(field, "min must be >= 0"));
    }
    if range.max < range.min {
        return Err(SolveError::domain(field, "max must be >= min"));
    }
    Ok(())
}

fn known(params: &ScenarioParameters, variable: Variable) -> Result<f64, SolveError> {
    params.value_of(variable).ok_or_else(|| {
        SolveError::AmbiguousUnknowns(format!("{variable} must be given for this solve"))
    })
}

fn resolve(params: &ScenarioParameters, variable: Variable) -> Result<ResolvedScenario, SolveError> {
    let scenario = match variable {
        Variable::LumpSum => {
            let monthly = known(params, Variable::MonthlyContribution)?;
            let years = known(params, Variable::AccumulationYears)?;
            let lump_sum = solve_currency(params, variable, monthly, years)?;
            evaluate(params, lump_sum, monthly, years)?
        }
        Variable::MonthlyContribution => {
            let lump_sum = known(params, Variable::LumpSum)?;
            let years = known(params, Variable::AccumulationYears)?;
            let monthly = solve_currency(params, variable, lump_sum, years)?;
            evaluate(params, lump_sum, monthly, years)?
        }
        Variable::AccumulationYears => {
            let lump_sum = known(params, Variable::LumpSum)?;
            let monthly = known(params, Variable::MonthlyContribution)?;
            let years = solve_years(params, lump_sum, monthly)?;
            evaluate(params, lump_sum, monthly, years)?
        }
    };
    debug!(
        %variable,
        value = scenario.value_of(variable),
        corpus = scenario.corpus_at_retirement,
        required = scenario.required_corpus,
        "solved unknown"
    );
    Ok(scenario)
}

/// Post-tax corpus as an affine function of one currency unknown `x`:
/// before tax `fv = fv_coef * x + fv_known`, principal likewise.
#[derive(Debug, Clone, Copy)]
struct LinearTerms {
    fv_coef: f64,
    fv_known: f64,
    principal_coef: f64,
    principal_known: f64,
}

impl LinearTerms {
    fn gain(self, x: f64) -> f64 {
        (self.fv_coef - self.principal_coef) * x + self.fv_known - self.principal_known
    }

    fn taxed_solution(self, required: f64, tax_rate: f64) -> Option<f64> {
        let denom = (1.0 - tax_rate) * self.fv_coef + tax_rate * self.principal_coef;
        let numer =
            required - (1.0 - tax_rate) * self.fv_known - tax_rate * self.principal_known;
        finite_ratio(numer, denom)
    }

    fn untaxed_solution(self, required: f64) -> Option<f64> {
        finite_ratio(required - self.fv_known, self.fv_coef)
    }
}

fn finite_ratio(numer: f64, denom: f64) -> Option<f64> {
    if denom > 0.0 && denom.is_finite() {
        Some(numer / denom).filter(|x| x.is_finite())
    } else {
        None
    }
}

/// Closed-form solve for the lump sum or monthly contribution. The balance is
/// piecewise linear: taxed while the gain is non-negative, untaxed otherwise.
fn solve_currency(
    params: &ScenarioParameters,
    variable: Variable,
    other: f64,
    years: f64,
) -> Result<f64, SolveError> {
    let factors = AccumulationFactors::new(years, params.annual_return)?;
    let required = required_corpus_at(params, years)?;
    let terms = match variable {
        Variable::LumpSum => LinearTerms {
            fv_coef: factors.growth,
            fv_known: factors.future_value(0.0, other),
            principal_coef: 1.0,
            principal_known: factors.principal(0.0, other),
        },
        Variable::MonthlyContribution => LinearTerms {
            fv_coef: factors.annuity,
            fv_known: factors.future_value(other, 0.0),
            principal_coef: factors.periods,
            principal_known: factors.principal(other, 0.0),
        },
        Variable::AccumulationYears => {
            return Err(SolveError::AmbiguousUnknowns(
                "accumulation years has no closed form".to_string(),
            ));
        }
    };

    let branch_tol = 1e-9 * required.abs().max(1.0);
    if let Some(x) = terms.taxed_solution(required, params.capital_gains_tax_rate) {
        if terms.gain(x) >= -branch_tol {
            return Ok(x);
        }
    }
    if let Some(x) = terms.untaxed_solution(required) {
        if terms.gain(x) <= branch_tol {
            return Ok(x);
        }
    }

    warn!(%variable, years, "closed form inconsistent, falling back to bisection");
    let bound = CURRENCY_BRACKET_SCALE * required.abs().max(params.desired_monthly_income_today);
    let gap = |x: f64| {
        let (lump_sum, monthly) = match variable {
            Variable::LumpSum => (x, other),
            _ => (other, x),
        };
        balance_gap(params, lump_sum, monthly, years).unwrap_or(f64::NAN)
    };
    Bisection::default()
        .find_root(gap, Bracket::new(-bound, bound))
        .map_err(|e| root_failure(variable, e))
}

/// Finds the earliest accumulation time at which the post-tax corpus covers
/// the withdrawals. Already funded at time zero solves to zero.
fn solve_years(params: &ScenarioParameters, lump_sum: f64, monthly: f64) -> Result<f64, SolveError> {
    let at_start = balance_gap(params, lump_sum, monthly, 0.0)?;
    if at_start >= 0.0 {
        return Ok(0.0);
    }

    let gap = |years: f64| balance_gap(params, lump_sum, monthly, years).unwrap_or(f64::NAN);
    let bracket = scan_for_sign_change(&gap, 0.0, YEAR_SEARCH_CAP, YEAR_SCAN_STEP).ok_or_else(
        || {
            SolveError::no_solution(
                Variable::AccumulationYears,
                format!("goal not reached within {YEAR_SEARCH_CAP} years"),
            )
        },
    )?;

    Bisection::default()
        .find_root(&gap, bracket)
        .map_err(|e| root_failure(Variable::AccumulationYears, e))
}

fn root_failure(variable: Variable, err: RootError) -> SolveError {
    SolveError::no_solution(variable, err.to_string())
}

/// Maps a per-point `NoSolution` to a gap; every other error aborts the sweep.
fn solve_point(
    params: &ScenarioParameters,
    variable: Variable,
) -> Result<Option<ResolvedScenario>, SolveError> {
    match resolve(params, variable) {
        Ok(scenario) => Ok(Some(scenario)),
        Err(e) if e.is_no_solution() => Ok(None),
        Err(e) => Err(e),
    }
}

fn trade_off_curve(
    params: &ScenarioParameters,
    options: &SolveOptions,
    sweep: Variable,
    solve_for: Variable,
) -> Result<TradeOffCurve, SolveError> {
    let range = options.range_for(sweep, params.desired_monthly_income_today);
    let points = range
        .values(options.curve_points)
        .into_iter()
        .map(|sweep_value| {
            let fixed = params.with_value(sweep, sweep_value);
            Ok(CurvePoint {
                sweep_value,
                scenario: solve_point(&fixed, solve_for)?,
            })
        })
        .collect::<Result<Vec<_>, SolveError>>()?;

    let gaps = points.iter().filter(|p| p.scenario.is_none()).count();
    debug!(%sweep, %solve_for, points = points.len(), gaps, "built trade-off curve");
    Ok(TradeOffCurve {
        sweep,
        solved_for: solve_for,
        points,
    })
}

fn trade_off_surface(
    params: &ScenarioParameters,
    options: &SolveOptions,
    x_axis: Variable,
    y_axis: Variable,
    solve_for: Variable,
) -> Result<TradeOffSurface, SolveError> {
    let income = params.desired_monthly_income_today;
    let x_values = options.range_for(x_axis, income).values(options.grid_points);
    let y_values = options.range_for(y_axis, income).values(options.grid_points);

    let coords: Vec<(f64, f64)> = y_values
        .iter()
        .flat_map(|y| x_values.iter().map(move |x| (*x, *y)))
        .collect();
    let solve_cell = |(x, y): &(f64, f64)| {
        let fixed = params.with_value(x_axis, *x).with_value(y_axis, *y);
        solve_point(&fixed, solve_for)
    };

    #[cfg(feature = "parallel")]
    let solved: Vec<Result<Option<ResolvedScenario>, SolveError>> =
        coords.par_iter().map(solve_cell).collect();
    #[cfg(not(feature = "parallel"))]
    let solved: Vec<Result<Option<ResolvedScenario>, SolveError>> =
        coords.iter().map(solve_cell).collect();

    let flat = solved.into_iter().collect::<Result<Vec<_>, SolveError>>()?;
    let cells: Vec<Vec<Option<ResolvedScenario>>> = flat
        .chunks(x_values.len())
        .map(|row| row.to_vec())
        .collect();

    debug!(
        %x_axis,
        %y_axis,
        %solve_for,
        rows = cells.len(),
        columns = x_values.len(),
        "built trade-off surface"
    );
    Ok(TradeOffSurface {
        x_axis,
        y_axis,
        solved_for: solve_for,
        x_values,
        y_values,
        cells,
    })
}
