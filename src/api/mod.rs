use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    IncomeBasis, MAX_CURVE_POINTS, MAX_GRID_POINTS, ResolvedScenario, ScenarioParameters,
    SolveError, SolveOptions, SolveResult, SweepRange, TradeOffCurve, TradeOffSurface, Variable,
    solve_with,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliVariable {
    LumpSum,
    Monthly,
    Years,
}

impl From<CliVariable> for Variable {
    fn from(value: CliVariable) -> Self {
        match value {
            CliVariable::LumpSum => Variable::LumpSum,
            CliVariable::Monthly => Variable::MonthlyContribution,
            CliVariable::Years => Variable::AccumulationYears,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliIncomeBasis {
    TodaysMoney,
    AtRetirement,
}

impl From<CliIncomeBasis> for IncomeBasis {
    fn from(value: CliIncomeBasis) -> Self {
        match value {
            CliIncomeBasis::TodaysMoney => IncomeBasis::TodaysMoney,
            CliIncomeBasis::AtRetirement => IncomeBasis::AtRetirement,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiVariable {
    #[serde(alias = "lumpSum", alias = "lump_sum", alias = "initial")]
    LumpSum,
    #[serde(
        alias = "monthlyContribution",
        alias = "monthly_contribution",
        alias = "monthly-contribution"
    )]
    Monthly,
    #[serde(alias = "accumulationYears", alias = "accumulation_years")]
    Years,
}

impl From<ApiVariable> for CliVariable {
    fn from(value: ApiVariable) -> Self {
        match value {
            ApiVariable::LumpSum => CliVariable::LumpSum,
            ApiVariable::Monthly => CliVariable::Monthly,
            ApiVariable::Years => CliVariable::Years,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiIncomeBasis {
    #[serde(alias = "todaysMoney", alias = "todays_money", alias = "today")]
    TodaysMoney,
    #[serde(alias = "atRetirement", alias = "at_retirement", alias = "retirement")]
    AtRetirement,
}

impl From<ApiIncomeBasis> for CliIncomeBasis {
    fn from(value: ApiIncomeBasis) -> Self {
        match value {
            ApiIncomeBasis::TodaysMoney => CliIncomeBasis::TodaysMoney,
            ApiIncomeBasis::AtRetirement => CliIncomeBasis::AtRetirement,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
enum ResponseMode {
    Forward,
    Single,
    Curve,
    Surface,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    income: Option<f64>,
    withdrawal_years: Option<f64>,
    inflation_rate: Option<f64>,
    annual_return: Option<f64>,
    tax_rate: Option<f64>,
    income_basis: Option<ApiIncomeBasis>,

    #[serde(alias = "initial")]
    lump_sum: Option<f64>,
    #[serde(alias = "monthlyContribution")]
    monthly: Option<f64>,
    #[serde(alias = "accumulationYears")]
    years: Option<f64>,

    sweep: Option<ApiVariable>,
    solve_for: Option<ApiVariable>,
    points: Option<usize>,
    grid: Option<usize>,
    lump_sum_min: Option<f64>,
    lump_sum_max: Option<f64>,
    monthly_min: Option<f64>,
    monthly_max: Option<f64>,
    years_min: Option<f64>,
    years_max: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "swp-planner",
    about = "Solve lump sum, monthly SIP or accumulation time for an inflation-indexed SWP retirement goal"
)]
pub struct Cli {
    #[arg(long, help = "Desired monthly withdrawal in today's money")]
    income: f64,
    #[arg(long, default_value_t = 20.0, help = "Withdrawal horizon in years")]
    withdrawal_years: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected annual inflation in percent"
    )]
    inflation_rate: f64,
    #[arg(
        long,
        default_value_t = 12.5,
        help = "Expected pre-tax annual return in percent"
    )]
    annual_return: f64,
    #[arg(
        long,
        default_value_t = 12.5,
        help = "Capital gains tax rate on the gain at retirement in percent"
    )]
    tax_rate: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliIncomeBasis::TodaysMoney,
        help = "Whether --income is in today's money or already the first withdrawal"
    )]
    income_basis: CliIncomeBasis,

    #[arg(long, help = "Upfront lump sum; omit to solve for it")]
    lump_sum: Option<f64>,
    #[arg(long, help = "Monthly contribution (SIP); omit to solve for it")]
    monthly: Option<f64>,
    #[arg(long, help = "Accumulation period in years; omit to solve for it")]
    years: Option<f64>,

    #[arg(
        long,
        value_enum,
        help = "Unknown to sweep when two fields are omitted"
    )]
    sweep: Option<CliVariable>,
    #[arg(
        long,
        value_enum,
        help = "Unknown to solve across the grid when all three fields are omitted"
    )]
    solve_for: Option<CliVariable>,
    #[arg(long, default_value_t = 50, help = "Sample points on a trade-off curve")]
    points: usize,
    #[arg(long, default_value_t = 20, help = "Grid points per axis on a trade-off surface")]
    grid: usize,
    #[arg(long)]
    lump_sum_min: Option<f64>,
    #[arg(long)]
    lump_sum_max: Option<f64>,
    #[arg(long)]
    monthly_min: Option<f64>,
    #[arg(long)]
    monthly_max: Option<f64>,
    #[arg(long)]
    years_min: Option<f64>,
    #[arg(long)]
    years_max: Option<f64>,

    #[arg(long, help = "Print the JSON response instead of a table")]
    json: bool,
}

#[derive(Debug)]
struct SolveRequest {
    params: ScenarioParameters,
    options: SolveOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssumptionsView {
    desired_monthly_income_today: f64,
    withdrawal_years: f64,
    inflation_rate: f64,
    annual_return: f64,
    capital_gains_tax_rate: f64,
    income_basis: IncomeBasis,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioView {
    lump_sum: f64,
    monthly_contribution: f64,
    accumulation_years: f64,
    principal_contributed: f64,
    corpus_before_tax: f64,
    corpus_at_retirement: f64,
    first_withdrawal: f64,
    required_corpus: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_solved_value: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurveView {
    sweep: Variable,
    solved_for: Variable,
    sweep_values: Vec<f64>,
    solved_values: Vec<Option<f64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SurfaceView {
    x_axis: Variable,
    y_axis: Variable,
    solved_for: Variable,
    x_values: Vec<f64>,
    y_values: Vec<f64>,
    values: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    mode: ResponseMode,
    assumptions: AssumptionsView,
    #[serde(skip_serializing_if = "Option::is_none")]
    solved_for: Option<Variable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<ScenarioView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    curve: Option<CurveView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface: Option<SurfaceView>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: Cli) -> Result<SolveRequest, String> {
    if !cli.income.is_finite() || cli.income <= 0.0 {
        return Err("--income must be > 0".to_string());
    }

    if !cli.withdrawal_years.is_finite() || cli.withdrawal_years <= 0.0 {
        return Err("--withdrawal-years must be > 0".to_string());
    }

    for (name, rate) in [
        ("--inflation-rate", cli.inflation_rate),
        ("--annual-return", cli.annual_return),
    ] {
        if !rate.is_finite() || rate <= -100.0 {
            return Err(format!("{name} must be > -100"));
        }
    }

    if !cli.tax_rate.is_finite() || !(0.0..100.0).contains(&cli.tax_rate) {
        return Err("--tax-rate must be between 0 and 100 (exclusive upper)".to_string());
    }

    for (name, value) in [("--lump-sum", cli.lump_sum), ("--monthly", cli.monthly)] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("{name} must be >= 0"));
            }
        }
    }

    if let Some(years) = cli.years {
        if !years.is_finite() || years <= 0.0 {
            return Err("--years must be > 0".to_string());
        }
    }

    if !(1..=MAX_CURVE_POINTS).contains(&cli.points) {
        return Err(format!("--points must be between 1 and {MAX_CURVE_POINTS}"));
    }

    if !(1..=MAX_GRID_POINTS).contains(&cli.grid) {
        return Err(format!("--grid must be between 1 and {MAX_GRID_POINTS}"));
    }

    let lump_sum_range = sweep_range("--lump-sum", cli.lump_sum_min, cli.lump_sum_max)?;
    let monthly_range = sweep_range("--monthly", cli.monthly_min, cli.monthly_max)?;
    let years_range = sweep_range("--years", cli.years_min, cli.years_max)?;

    Ok(SolveRequest {
        params: ScenarioParameters {
            lump_sum: cli.lump_sum,
            monthly_contribution: cli.monthly,
            accumulation_years: cli.years,
            desired_monthly_income_today: cli.income,
            withdrawal_years: cli.withdrawal_years,
            inflation_rate: cli.inflation_rate / 100.0,
            annual_return: cli.annual_return / 100.0,
            capital_gains_tax_rate: cli.tax_rate / 100.0,
            income_basis: cli.income_basis.into(),
        },
        options: SolveOptions {
            sweep: cli.sweep.map(Into::into),
            solve_for: cli.solve_for.map(Into::into),
            curve_points: cli.points,
            grid_points: cli.grid,
            lump_sum_range,
            monthly_contribution_range: monthly_range,
            accumulation_years_range: years_range,
        },
    })
}

fn sweep_range(
    prefix: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Option<SweepRange>, String> {
    match (min, max) {
        (None, None) => Ok(None),
        (Some(min), Some(max)) => {
            if !min.is_finite() || !max.is_finite() || min < 0.0 {
                return Err(format!("{prefix}-min and {prefix}-max must be finite and >= 0"));
            }
            if max < min {
                return Err(format!("{prefix}-max must be >= {prefix}-min"));
            }
            Ok(Some(SweepRange::new(min, max)))
        }
        _ => Err(format!(
            "{prefix}-min and {prefix}-max must be given together"
        )),
    }
}

/// Output values are clipped here, never in the core.
fn clip(value: f64) -> f64 {
    value.max(0.0)
}

fn scenario_view(scenario: &ResolvedScenario, solved_for: Option<Variable>) -> ScenarioView {
    ScenarioView {
        lump_sum: clip(scenario.lump_sum),
        monthly_contribution: clip(scenario.monthly_contribution),
        accumulation_years: clip(scenario.accumulation_years),
        principal_contributed: clip(scenario.principal_contributed),
        corpus_before_tax: clip(scenario.corpus_before_tax),
        corpus_at_retirement: clip(scenario.corpus_at_retirement),
        first_withdrawal: scenario.first_withdrawal,
        required_corpus: scenario.required_corpus,
        raw_solved_value: solved_for.map(|v| scenario.value_of(v)),
    }
}

fn curve_view(curve: &TradeOffCurve) -> CurveView {
    CurveView {
        sweep: curve.sweep,
        solved_for: curve.solved_for,
        sweep_values: curve.points.iter().map(|p| p.sweep_value).collect(),
        solved_values: curve
            .points
            .iter()
            .map(|p| p.scenario.map(|s| clip(s.value_of(curve.solved_for))))
            .collect(),
    }
}

fn surface_view(surface: &TradeOffSurface) -> SurfaceView {
    SurfaceView {
        x_axis: surface.x_axis,
        y_axis: surface.y_axis,
        solved_for: surface.solved_for,
        x_values: surface.x_values.clone(),
        y_values: surface.y_values.clone(),
        values: surface
            .cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(|s| clip(s.value_of(surface.solved_for))))
                    .collect()
            })
            .collect(),
    }
}

fn build_solve_response(params: &ScenarioParameters, result: &SolveResult) -> SolveResponse {
    let assumptions = AssumptionsView {
        desired_monthly_income_today: params.desired_monthly_income_today,
        withdrawal_years: params.withdrawal_years,
        inflation_rate: params.inflation_rate,
        annual_return: params.annual_return,
        capital_gains_tax_rate: params.capital_gains_tax_rate,
        income_basis: params.income_basis,
    };
    let mut response = SolveResponse {
        mode: ResponseMode::Forward,
        assumptions,
        solved_for: None,
        scenario: None,
        curve: None,
        surface: None,
    };
    match result {
        SolveResult::Forward(scenario) => {
            response.scenario = Some(scenario_view(scenario, None));
        }
        SolveResult::Single {
            solved_for,
            scenario,
        } => {
            response.mode = ResponseMode::Single;
            response.solved_for = Some(*solved_for);
            response.scenario = Some(scenario_view(scenario, Some(*solved_for)));
        }
        SolveResult::Curve(curve) => {
            response.mode = ResponseMode::Curve;
            response.solved_for = Some(curve.solved_for);
            response.curve = Some(curve_view(curve));
        }
        SolveResult::Surface(surface) => {
            response.mode = ResponseMode::Surface;
            response.solved_for = Some(surface.solved_for);
            response.surface = Some(surface_view(surface));
        }
    }
    response
}

/// Groups the integer part in thousands, two decimals.
fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

fn variable_label(variable: Variable) -> &'static str {
    match variable {
        Variable::LumpSum => "Lump sum",
        Variable::MonthlyContribution => "Monthly SIP",
        Variable::AccumulationYears => "Years",
    }
}

fn assumptions_line(params: &ScenarioParameters) -> String {
    format!(
        "Tax rate = {:.1}%, Inflation rate = {:.1}%, Annual return = {:.1}%, \
         Withdrawal horizon = {} years, Monthly withdrawal = {}",
        params.capital_gains_tax_rate * 100.0,
        params.inflation_rate * 100.0,
        params.annual_return * 100.0,
        params.withdrawal_years,
        format_amount(params.desired_monthly_income_today),
    )
}

fn render_scenario(view: &ScenarioView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Result");
    for (label, value) in [
        ("lump_sum", view.lump_sum),
        ("monthly_contribution", view.monthly_contribution),
        ("accumulation_years", view.accumulation_years),
        ("principal_contributed", view.principal_contributed),
        ("corpus_before_tax", view.corpus_before_tax),
        ("corpus_at_retirement", view.corpus_at_retirement),
        ("first_withdrawal", view.first_withdrawal),
        ("required_corpus", view.required_corpus),
    ] {
        let _ = writeln!(out, "{label:<25}: {}", format_amount(value));
    }
    if let Some(raw) = view.raw_solved_value {
        if raw < 0.0 {
            let _ = writeln!(out, "{:<25}: {}", "raw_solved_value", format_amount(raw));
        }
    }
    out
}

fn render_curve(params: &ScenarioParameters, view: &CurveView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", assumptions_line(params));
    let _ = writeln!(
        out,
        "{} vs {}",
        variable_label(view.solved_for),
        variable_label(view.sweep)
    );
    let _ = writeln!(
        out,
        "{:>20}  {:>20}",
        variable_label(view.sweep),
        variable_label(view.solved_for)
    );
    for (sweep, solved) in view.sweep_values.iter().zip(&view.solved_values) {
        let solved = solved.map_or_else(|| "unreachable".to_string(), format_amount);
        let _ = writeln!(out, "{:>20}  {:>20}", format_amount(*sweep), solved);
    }
    out
}

fn render_surface(params: &ScenarioParameters, view: &SurfaceView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", assumptions_line(params));
    let _ = writeln!(
        out,
        "{} requirement surface (negatives clipped)",
        variable_label(view.solved_for)
    );
    let header: Vec<String> = view.x_values.iter().map(|x| format!("{x:.2}")).collect();
    let _ = writeln!(
        out,
        "{}\\{},{}",
        variable_label(view.y_axis),
        variable_label(view.x_axis),
        header.join(",")
    );
    for (y, row) in view.y_values.iter().zip(&view.values) {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| cell.map_or_else(String::new, |v| format!("{v:.2}")))
            .collect();
        let _ = writeln!(out, "{y:.2},{}", cells.join(","));
    }
    out
}

fn render_text(params: &ScenarioParameters, response: &SolveResponse) -> String {
    if let Some(scenario) = &response.scenario {
        return render_scenario(scenario);
    }
    if let Some(curve) = &response.curve {
        return render_curve(params, curve);
    }
    if let Some(surface) = &response.surface {
        return render_surface(params, surface);
    }
    String::new()
}

fn solve_request(request: &SolveRequest) -> Result<SolveResponse, SolveError> {
    let result = solve_with(&request.params, &request.options)?;
    Ok(build_solve_response(&request.params, &result))
}

/// Runs a single solve from command-line arguments and renders the output.
pub fn run_cli(cli: Cli) -> Result<String, String> {
    let json = cli.json;
    let request = build_request(cli)?;
    let response = solve_request(&request).map_err(|e| e.to_string())?;
    if json {
        serde_json::to_string_pretty(&response)
            .map(|s| format!("{s}\n"))
            .map_err(|e| format!("failed to serialize response: {e}"))
    } else {
        Ok(render_text(&request.params, &response))
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/solve",
            get(solve_get_handler).post(solve_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "SWP planner HTTP API listening");
    info!("Local access: http://127.0.0.1:{port}/api/solve");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn solve_get_handler(Query(payload): Query<SolvePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_post_handler(Json(payload): Json<SolvePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_handler_impl(payload: SolvePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match solve_request(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            warn!(error = %err, "solve failed");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

fn status_for(err: &SolveError) -> StatusCode {
    match err {
        SolveError::Domain { .. } | SolveError::AmbiguousUnknowns(_) => StatusCode::BAD_REQUEST,
        SolveError::NoSolution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<SolveRequest, String> {
    let payload = serde_json::from_str::<SolvePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SolvePayload) -> Result<SolveRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.income {
        cli.income = v;
    }
    if let Some(v) = payload.withdrawal_years {
        cli.withdrawal_years = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.annual_return {
        cli.annual_return = v;
    }
    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }
    if let Some(v) = payload.income_basis {
        cli.income_basis = v.into();
    }

    cli.lump_sum = payload.lump_sum;
    cli.monthly = payload.monthly;
    cli.years = payload.years;

    cli.sweep = payload.sweep.map(Into::into);
    cli.solve_for = payload.solve_for.map(Into::into);
    if let Some(v) = payload.points {
        cli.points = v;
    }
    if let Some(v) = payload.grid {
        cli.grid = v;
    }
    cli.lump_sum_min = payload.lump_sum_min;
    cli.lump_sum_max = payload.lump_sum_max;
    cli.monthly_min = payload.monthly_min;
    cli.monthly_max = payload.monthly_max;
    cli.years_min = payload.years_min;
    cli.years_max = payload.years_max;

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        income: 100_000.0,
        withdrawal_years: 10.0,
        inflation_rate: 7.0,
        annual_return: 12.5,
        tax_rate: 12.5,
        income_basis: CliIncomeBasis::TodaysMoney,
        lump_sum: None,
        monthly: None,
        years: None,
        sweep: None,
        solve_for: None,
        points: 50,
        grid: 20,
        lump_sum_min: None,
        lump_sum_max: None,
        monthly_min: None,
        monthly_max: None,
        years_min: None,
        years_max: None,
        json: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        let mut cli = default_cli_for_api();
        cli.income = 8_000.0;
        cli.withdrawal_years = 20.0;
        cli.inflation_rate = 7.0;
        cli.annual_return = 11.0;
        cli.tax_rate = 12.5;
        cli.lump_sum = Some(500_000.0);
        cli.monthly = Some(2_455.31);
        cli
    }

    #[test]
    fn cli_parses_flags_and_percentages() {
        let cli = Cli::try_parse_from([
            "swp-planner",
            "--income",
            "100000",
            "--withdrawal-years",
            "10",
            "--annual-return",
            "12.5",
            "--monthly",
            "16000",
            "--sweep",
            "lump-sum",
        ])
        .expect("valid arguments");
        let request = build_request(cli).expect("valid inputs");

        assert_approx(request.params.annual_return, 0.125);
        assert_approx(request.params.inflation_rate, 0.07);
        assert_approx(request.params.capital_gains_tax_rate, 0.125);
        assert_eq!(request.params.monthly_contribution, Some(16_000.0));
        assert_eq!(request.params.lump_sum, None);
        assert_eq!(request.options.sweep, Some(Variable::LumpSum));
        assert_eq!(request.options.curve_points, 50);
    }

    #[test]
    fn build_request_rejects_invalid_inputs() {
        let mut cli = sample_cli();
        cli.tax_rate = 100.0;
        assert!(build_request(cli).is_err());

        let mut cli = sample_cli();
        cli.annual_return = -100.0;
        assert!(build_request(cli).is_err());

        let mut cli = sample_cli();
        cli.income = 0.0;
        assert!(build_request(cli).is_err());

        let mut cli = sample_cli();
        cli.lump_sum = Some(-1.0);
        assert!(build_request(cli).is_err());

        let mut cli = sample_cli();
        cli.years = Some(0.0);
        assert!(build_request(cli).is_err());
    }

    #[test]
    fn build_request_requires_paired_range_bounds() {
        let mut cli = sample_cli();
        cli.lump_sum_min = Some(0.0);
        let err = build_request(cli).expect_err("half range");
        assert!(err.contains("--lump-sum-min and --lump-sum-max"));

        let mut cli = sample_cli();
        cli.years_min = Some(5.0);
        cli.years_max = Some(25.0);
        let request = build_request(cli).expect("valid range");
        assert_eq!(
            request.options.accumulation_years_range,
            Some(SweepRange::new(5.0, 25.0))
        );
    }

    #[test]
    fn api_request_from_json_parses_web_keys() {
        let json = r#"{
            "income": 8000,
            "withdrawalYears": 20,
            "inflationRate": 7,
            "annualReturn": 11,
            "taxRate": 12.5,
            "incomeBasis": "atRetirement",
            "initial": 500000,
            "monthlyContribution": 2455.31,
            "sweep": "years",
            "points": 10,
            "yearsMin": 1,
            "yearsMax": 40
        }"#;
        let request = api_request_from_json(json).expect("valid payload");
        assert_eq!(request.params.lump_sum, Some(500_000.0));
        assert_eq!(request.params.monthly_contribution, Some(2_455.31));
        assert_eq!(request.params.accumulation_years, None);
        assert_eq!(request.params.income_basis, IncomeBasis::AtRetirement);
        assert_approx(request.params.annual_return, 0.11);
        assert_eq!(request.options.sweep, Some(Variable::AccumulationYears));
        assert_eq!(request.options.curve_points, 10);
        assert_eq!(
            request.options.accumulation_years_range,
            Some(SweepRange::new(1.0, 40.0))
        );
    }

    #[test]
    fn api_request_defaults_leave_all_fields_unknown() {
        let request = api_request_from_json("{}").expect("defaults are valid");
        assert_eq!(request.params.unknowns().len(), 3);
        assert_approx(request.params.desired_monthly_income_today, 100_000.0);
        assert_approx(request.params.withdrawal_years, 10.0);
    }

    #[test]
    fn api_request_rejects_oversized_sweeps() {
        let err = api_request_from_json(r#"{"grid": 100000000, "points": 4000000000}"#)
            .expect_err("unbounded sweep");
        assert!(err.starts_with("--points must be between 1 and 1000"), "{err}");

        let err = api_request_from_json(r#"{"grid": 201}"#).expect_err("grid too large");
        assert_eq!(err, "--grid must be between 1 and 200");

        let request = api_request_from_json(r#"{"grid": 200, "points": 1000}"#)
            .expect("largest allowed sweep");
        assert_eq!(request.options.grid_points, 200);
        assert_eq!(request.options.curve_points, 1_000);
    }

    #[test]
    fn api_request_rejects_unknown_variable_names() {
        assert!(api_request_from_json(r#"{"sweep": "salary"}"#).is_err());
    }

    #[test]
    fn single_response_clips_negative_solution_but_keeps_raw_value() {
        let mut cli = sample_cli();
        cli.lump_sum = Some(5_000_000.0);
        cli.monthly = None;
        cli.years = Some(10.0);
        let request = build_request(cli).expect("valid inputs");
        let response = solve_request(&request).expect("solvable");

        assert_eq!(response.mode, ResponseMode::Single);
        assert_eq!(response.solved_for, Some(Variable::MonthlyContribution));
        let scenario = response.scenario.as_ref().expect("scenario view");
        assert_eq!(scenario.monthly_contribution, 0.0);
        assert!(scenario.raw_solved_value.expect("raw value") < 0.0);

        let text = render_text(&request.params, &response);
        assert!(text.contains("monthly_contribution     : 0.00"));
        assert!(text.contains("raw_solved_value"));
    }

    #[test]
    fn solve_response_serialization_contains_expected_fields() {
        let mut cli = sample_cli();
        cli.monthly = None;
        cli.years = Some(10.0);
        let request = build_request(cli).expect("valid inputs");
        let response = solve_request(&request).expect("solvable");
        let json = serde_json::to_string(&response).expect("response should serialize");

        assert!(json.contains("\"mode\":\"single\""));
        assert!(json.contains("\"solvedFor\":\"monthlyContribution\""));
        assert!(json.contains("\"corpusAtRetirement\""));
        assert!(json.contains("\"requiredCorpus\""));
        assert!(json.contains("\"rawSolvedValue\""));
        assert!(json.contains("\"incomeBasis\":\"todaysMoney\""));
        assert!(!json.contains("\"curve\""));
    }

    #[test]
    fn curve_response_lists_sweep_and_solved_values() {
        let mut cli = sample_cli();
        cli.lump_sum = None;
        cli.monthly = None;
        cli.years = Some(10.0);
        cli.points = 5;
        let request = build_request(cli).expect("valid inputs");
        let response = solve_request(&request).expect("solvable");

        assert_eq!(response.mode, ResponseMode::Curve);
        let curve = response.curve.as_ref().expect("curve view");
        assert_eq!(curve.sweep, Variable::LumpSum);
        assert_eq!(curve.sweep_values.len(), 5);
        assert_eq!(curve.solved_values.len(), 5);
        assert!(curve.solved_values.iter().all(|v| v.is_some_and(|v| v >= 0.0)));

        let text = render_text(&request.params, &response);
        assert!(text.starts_with("Tax rate = 12.5%"));
        assert!(text.contains("Monthly SIP vs Lump sum"));
        assert_eq!(text.lines().count(), 3 + 5);
    }

    #[test]
    fn surface_response_is_clipped_grid() {
        let mut cli = sample_cli();
        cli.lump_sum = None;
        cli.monthly = None;
        cli.years = None;
        cli.grid = 4;
        let request = build_request(cli).expect("valid inputs");
        let response = solve_request(&request).expect("solvable");

        let surface = response.surface.as_ref().expect("surface view");
        assert_eq!(surface.solved_for, Variable::LumpSum);
        assert_eq!(surface.values.len(), 4);
        for row in &surface.values {
            assert_eq!(row.len(), 4);
            assert!(row.iter().all(|v| v.is_some_and(|v| v >= 0.0)));
        }

        let text = render_text(&request.params, &response);
        assert!(text.contains("Years\\Monthly SIP,"));
        assert_eq!(text.lines().count(), 3 + 4);
    }

    #[test]
    fn ambiguous_and_unsolvable_requests_map_to_status_codes() {
        let mut cli = sample_cli();
        cli.sweep = Some(CliVariable::LumpSum);
        let request = build_request(cli).expect("valid inputs");
        let err = solve_request(&request).expect_err("lump sum is given");
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);

        let mut cli = sample_cli();
        cli.income = 100_000.0;
        cli.lump_sum = Some(0.0);
        cli.monthly = Some(1.0);
        let request = build_request(cli).expect("valid inputs");
        let err = solve_request(&request).expect_err("unreachable goal");
        assert_eq!(status_for(&err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn run_cli_prints_json_when_requested() {
        let mut cli = sample_cli();
        cli.years = Some(10.0);
        cli.json = true;
        let out = run_cli(cli).expect("forward evaluation");
        assert!(out.contains("\"mode\": \"forward\""));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn format_amount_groups_thousands() {
        assert_eq!(format_amount(0.0), "0.00");
        assert_eq!(format_amount(999.999), "1,000.00");
        assert_eq!(format_amount(3_184_621.254), "3,184,621.25");
        assert_eq!(format_amount(-12_345.6), "-12,345.60");
        assert_eq!(format_amount(-0.001), "0.00");
    }
}
