use std::time::{Duration, Instant};

use wirecall_frame::parse_timeout;
use wirecall_rpc::{Client, ClientConfig, Context};

use crate::cmd::CallArgs;
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params: serde_json::Value = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;

    let config = ClientConfig::default().with_request_timeout(timeout);
    let client = Client::connect_with_config(&args.network, &args.addr, config)
        .map_err(|err| rpc_error("connect failed", err))?;

    let started = Instant::now();
    let reply: serde_json::Value = client
        .call(&Context::background(), &args.target, &params)
        .map_err(|err| rpc_error("call failed", err))?;
    let elapsed = started.elapsed();

    tracing::debug!(target_method = %args.target, elapsed_ms = elapsed.as_millis() as u64, "call complete");
    print_reply(&args.target, &reply, elapsed, format);
    Ok(SUCCESS)
}

/// Accepts `500ms`, `1.5s`, `250us` or a bare number of seconds.
fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let duration = parse_timeout(input)
        .or_else(|| input.parse::<u64>().ok().map(Duration::from_secs))
        .ok_or_else(|| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if duration.is_zero() {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(duration)
}
