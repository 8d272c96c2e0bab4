use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    EulerScaling, HouseholdProblem, JsonCurveWriter, Profile, SavingsSolution, SolverConfig,
    StitchCurve, StitchRenderer, consumption, euler_residuals, marginal_utility_vec,
    solve_savings,
};

const MAX_PERIODS: usize = 400;
const MAX_SIGMA: f64 = 20.0;
const MAX_ITERATIONS: u32 = 10_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliEulerScaling {
    Absolute,
    Percent,
}

impl From<CliEulerScaling> for EulerScaling {
    fn from(value: CliEulerScaling) -> Self {
        match value {
            CliEulerScaling::Absolute => EulerScaling::AbsoluteDifference,
            CliEulerScaling::Percent => EulerScaling::PercentDifference,
        }
    }
}

impl From<EulerScaling> for CliEulerScaling {
    fn from(value: EulerScaling) -> Self {
        match value {
            EulerScaling::AbsoluteDifference => CliEulerScaling::Absolute,
            EulerScaling::PercentDifference => CliEulerScaling::Percent,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "olg_household",
    about = "Household lifecycle savings with stitched CRRA marginal utility"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON HTTP API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Solve one household's savings path and print it as JSON
    Solve(SolveArgs),
    /// Write sampled CRRA and stitched marginal-utility curves as JSON
    StitchCurve {
        #[arg(long, default_value_t = 2.0)]
        sigma: f64,
        #[arg(long, default_value = "images/mu_c_stitched.json")]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct SolveArgs {
    #[arg(long, default_value_t = 3, help = "Remaining periods of life")]
    periods: usize,
    #[arg(long, default_value_t = 0.96, help = "Discount factor")]
    beta: f64,
    #[arg(
        long,
        default_value_t = 2.0,
        help = "Coefficient of relative risk aversion"
    )]
    sigma: f64,
    #[arg(long, default_value_t = 0.0, help = "Wealth carried into the first period")]
    initial_wealth: f64,
    #[arg(
        long,
        default_value = "1.0",
        value_parser = parse_profile,
        help = "Labor supply: one value, or comma-separated values per period"
    )]
    labor: Profile,
    #[arg(
        long,
        default_value = "0.05",
        value_parser = parse_profile,
        help = "Interest rate: one value, or comma-separated values per period"
    )]
    interest: Profile,
    #[arg(
        long,
        default_value = "1.0",
        value_parser = parse_profile,
        help = "Wage: one value, or comma-separated values per period"
    )]
    wage: Profile,
    #[arg(long, value_enum, default_value_t = CliEulerScaling::Absolute)]
    scaling: CliEulerScaling,
    #[arg(long, default_value_t = 1e-10)]
    tolerance: f64,
    #[arg(long, default_value_t = 100)]
    max_iterations: u32,
    #[arg(long, value_delimiter = ',', help = "Starting savings path, one value per period but the last")]
    initial_guess: Option<Vec<f64>>,
}

fn parse_profile(raw: &str) -> Result<Profile, String> {
    let values = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number {part:?}: {e}"))
        })
        .collect::<Result<Vec<f64>, String>>()?;
    match values.as_slice() {
        [single] => Ok(Profile::Constant(*single)),
        _ => Ok(Profile::Path(values)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    periods: Option<usize>,
    beta: Option<f64>,
    sigma: Option<f64>,
    initial_wealth: Option<f64>,
    labor: Option<Profile>,
    interest: Option<Profile>,
    wage: Option<Profile>,
    scaling: Option<EulerScaling>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    initial_guess: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumptionPayload {
    savings: Vec<f64>,
    initial_wealth: f64,
    labor: Profile,
    interest: Profile,
    wage: Profile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarginalUtilityPayload {
    consumption: Profile,
    sigma: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EulerErrorsPayload {
    consumption: Vec<f64>,
    beta: f64,
    sigma: f64,
    interest: Profile,
    #[serde(default)]
    scaling: EulerScaling,
}

#[derive(Debug)]
struct ApiRequest {
    problem: HouseholdProblem,
    config: SolverConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsumptionResponse {
    consumption: Vec<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarginalUtilityResponse {
    marginal_utility: Profile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EulerErrorsResponse {
    errors: Vec<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    periods: usize,
    scaling: EulerScaling,
    #[serde(flatten)]
    solution: SavingsSolution,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn build_problem(args: SolveArgs) -> Result<ApiRequest, String> {
    if args.periods == 0 {
        return Err("--periods must be >= 1".to_string());
    }

    if args.periods > MAX_PERIODS {
        return Err(format!("--periods must be <= {MAX_PERIODS}"));
    }

    if !args.beta.is_finite() || args.beta <= 0.0 || args.beta >= 1.0 {
        return Err("--beta must be between 0 and 1 (exclusive)".to_string());
    }

    if !args.sigma.is_finite() || args.sigma <= 0.0 || args.sigma > MAX_SIGMA {
        return Err(format!("--sigma must be > 0 and <= {MAX_SIGMA}"));
    }

    if !args.initial_wealth.is_finite() {
        return Err("--initial-wealth must be finite".to_string());
    }

    for (name, profile) in [
        ("--labor", &args.labor),
        ("--interest", &args.interest),
        ("--wage", &args.wage),
    ] {
        validate_profile(name, profile, args.periods)?;
    }

    if args.interest.values().iter().any(|r| *r <= -1.0) {
        return Err("--interest must be > -1 in every period".to_string());
    }

    if !args.tolerance.is_finite() || args.tolerance <= 0.0 {
        return Err("--tolerance must be > 0".to_string());
    }

    if args.max_iterations == 0 || args.max_iterations > MAX_ITERATIONS {
        return Err(format!("--max-iterations must be between 1 and {MAX_ITERATIONS}"));
    }

    if let Some(guess) = &args.initial_guess {
        if guess.len() != args.periods - 1 {
            return Err(format!(
                "--initial-guess must have {} values (periods - 1), got {}",
                args.periods - 1,
                guess.len()
            ));
        }
        if guess.iter().any(|b| !b.is_finite()) {
            return Err("--initial-guess values must be finite".to_string());
        }
    }

    Ok(ApiRequest {
        problem: HouseholdProblem {
            periods: args.periods,
            beta: args.beta,
            sigma: args.sigma,
            initial_wealth: args.initial_wealth,
            labor: args.labor,
            interest: args.interest,
            wage: args.wage,
            scaling: args.scaling.into(),
        },
        config: SolverConfig {
            tolerance: args.tolerance,
            max_iterations: args.max_iterations,
            initial_guess: args.initial_guess,
            ..SolverConfig::default()
        },
    })
}

fn validate_profile(name: &str, profile: &Profile, periods: usize) -> Result<(), String> {
    if let Profile::Path(values) = profile {
        if values.len() != periods {
            return Err(format!(
                "{name} must be a single value or have {periods} values, got {}",
                values.len()
            ));
        }
    }
    if profile.values().iter().any(|v| !v.is_finite()) {
        return Err(format!("{name} values must be finite"));
    }
    Ok(())
}

fn validate_sigma(sigma: f64) -> Result<(), String> {
    if !sigma.is_finite() || sigma <= 0.0 || sigma > MAX_SIGMA {
        return Err(format!("sigma must be > 0 and <= {MAX_SIGMA}"));
    }
    Ok(())
}

/// Runs a parsed command line to completion.
pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Solve(args) => {
            let request = build_problem(args)?;
            let response = solve_request(request)?;
            let json = serde_json::to_string_pretty(&response)
                .map_err(|e| format!("Failed to serialize solution: {e}"))?;
            println!("{json}");
            Ok(())
        }
        Command::StitchCurve { sigma, output } => {
            validate_sigma(sigma)?;
            let mut writer = JsonCurveWriter::new(output);
            writer
                .render(&StitchCurve::sample(sigma))
                .map_err(|e| e.to_string())?;
            println!("Wrote {}", writer.path().display());
            Ok(())
        }
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/consumption", post(consumption_handler))
        .route("/api/marginal-utility", post(marginal_utility_handler))
        .route("/api/euler-errors", post(euler_errors_handler))
        .route("/api/solve", post(solve_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "household HTTP API listening");
    info!("Local access: http://127.0.0.1:{port}/health");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn consumption_handler(Json(payload): Json<ConsumptionPayload>) -> Response {
    respond(evaluate_consumption(payload))
}

async fn marginal_utility_handler(Json(payload): Json<MarginalUtilityPayload>) -> Response {
    respond(evaluate_marginal_utility(payload))
}

async fn euler_errors_handler(Json(payload): Json<EulerErrorsPayload>) -> Response {
    respond(evaluate_euler_errors(payload))
}

async fn solve_handler(Json(payload): Json<SolvePayload>) -> Response {
    respond(api_request_from_payload(payload).and_then(solve_request))
}

fn respond<T: Serialize>(result: Result<T, String>) -> Response {
    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(msg) => {
            warn!(error = %msg, "rejected request");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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

fn evaluate_consumption(payload: ConsumptionPayload) -> Result<ConsumptionResponse, String> {
    if !payload.initial_wealth.is_finite() || payload.savings.iter().any(|b| !b.is_finite()) {
        return Err("savings and initialWealth must be finite".to_string());
    }
    let consumption = consumption(
        &payload.savings,
        payload.initial_wealth,
        &payload.labor,
        &payload.interest,
        &payload.wage,
    )
    .map_err(|e| e.to_string())?;
    Ok(ConsumptionResponse { consumption })
}

fn evaluate_marginal_utility(
    payload: MarginalUtilityPayload,
) -> Result<MarginalUtilityResponse, String> {
    validate_sigma(payload.sigma)?;
    let values = marginal_utility_vec(payload.consumption.values(), payload.sigma);
    let marginal_utility = match payload.consumption {
        Profile::Constant(_) => Profile::Constant(values[0]),
        Profile::Path(_) => Profile::Path(values),
    };
    Ok(MarginalUtilityResponse { marginal_utility })
}

fn evaluate_euler_errors(payload: EulerErrorsPayload) -> Result<EulerErrorsResponse, String> {
    validate_sigma(payload.sigma)?;
    let errors = euler_residuals(
        &payload.consumption,
        payload.beta,
        payload.sigma,
        &payload.interest,
        payload.scaling,
    )
    .map_err(|e| e.to_string())?;
    Ok(EulerErrorsResponse { errors })
}

fn solve_request(request: ApiRequest) -> Result<SolveResponse, String> {
    let solution = solve_savings(&request.problem, &request.config).map_err(|e| e.to_string())?;
    Ok(SolveResponse {
        periods: request.problem.periods,
        scaling: request.problem.scaling,
        solution,
    })
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SolvePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SolvePayload) -> Result<ApiRequest, String> {
    let mut args = default_solve_args();

    if let Some(v) = payload.periods {
        args.periods = v;
    }
    if let Some(v) = payload.beta {
        args.beta = v;
    }
    if let Some(v) = payload.sigma {
        args.sigma = v;
    }
    if let Some(v) = payload.initial_wealth {
        args.initial_wealth = v;
    }
    if let Some(v) = payload.labor {
        args.labor = v;
    }
    if let Some(v) = payload.interest {
        args.interest = v;
    }
    if let Some(v) = payload.wage {
        args.wage = v;
    }
    if let Some(v) = payload.scaling {
        args.scaling = v.into();
    }
    if let Some(v) = payload.tolerance {
        args.tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        args.max_iterations = v;
    }
    if let Some(v) = payload.initial_guess {
        args.initial_guess = Some(v);
    }

    build_problem(args)
}

fn default_solve_args() -> SolveArgs {
    SolveArgs {
        periods: 3,
        beta: 0.96,
        sigma: 2.0,
        initial_wealth: 0.0,
        labor: Profile::Path(vec![1.0, 1.0, 0.2]),
        interest: Profile::Constant(0.05),
        wage: Profile::Constant(1.0),
        scaling: CliEulerScaling::Absolute,
        tolerance: 1e-10,
        max_iterations: 100,
        initial_guess: None,
    }
}
