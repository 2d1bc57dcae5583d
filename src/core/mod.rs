mod engine;
mod error;
mod roots;
mod solver;
mod types;

pub use engine::{
    accumulate, apply_capital_gains_tax, balance_gap, corpus_at_retirement, evaluate,
    first_withdrawal, monthly_equivalent_rate, principal_contributed,
    required_corpus_for_withdrawals,
};
pub use error::SolveError;
pub use roots::{Bisection, Bracket, RootError, RootFinder, scan_for_sign_change};
pub use solver::{
    MAX_CURVE_POINTS, MAX_GRID_POINTS, SolveMode, solve, solve_single, solve_with,
};
pub use types::{
    CurvePoint, IncomeBasis, ResolvedScenario, ScenarioParameters, SolveOptions, SolveResult,
    SweepRange, TradeOffCurve, TradeOffSurface, Variable,
};
