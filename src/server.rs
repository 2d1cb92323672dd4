use crate::protocol::{Request, Response, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
use crate::sandbox::AllowedRoots;
use crate::tools;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, info_span, Instrument, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

const USAGE: &str = "Usage: mcp-sandbox-fs [--allow-root <dir>]... <allowed-directory>...";

#[derive(Debug)]
struct ProtocolError {
	code: i64,
	message: String,
}

impl ProtocolError {
	fn new(code: i64, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into()
		}
	}
}

impl std::fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl std::error::Error for ProtocolError {}

/// Returned by [`parse_config`] for `-h`/`--help`; displays the usage text.
#[derive(Debug)]
pub struct HelpRequested;

impl std::fmt::Display for HelpRequested {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", USAGE)
	}
}

impl std::error::Error for HelpRequested {}

#[derive(Clone, Debug)]
pub struct Config {
	pub allowed_dirs: Vec<String>,
	pub otel_enabled: bool,
	pub otel_endpoint: String,
	pub otel_service_name: String,
	pub session_id: String,
}

impl Config {
	/// Resolves the configured directories into the sandbox boundary.
	pub fn allowed_roots(&self) -> Result<AllowedRoots> {
		if self.allowed_dirs.is_empty() {
			return Err(anyhow!("at least one allowed directory is required\n{}", USAGE));
		}
		AllowedRoots::from_dirs(&self.allowed_dirs).context("invalid allowed directory")
	}
}

pub fn load_config() -> Result<Config> {
	parse_config(std::env::args().skip(1), |key| std::env::var(key).ok())
}

/// Arguments first, then environment variables for anything left unset.
pub fn parse_config<I, F>(args: I, env: F) -> Result<Config>
where
	I: IntoIterator<Item = String>,
	F: Fn(&str) -> Option<String>, {
	let mut allowed_dirs: Vec<String> = Vec::new();
	let mut otel_enabled: Option<bool> = None;
	let mut otel_endpoint: Option<String> = None;
	let mut otel_service_name: Option<String> = None;
	let mut args = args.into_iter();
	while let Some(arg) = args.next() {
		match arg.as_str() {
			"--allow-root" => {
				let value = args.next().ok_or_else(|| anyhow!("--allow-root requires a value"))?;
				if !value.trim().is_empty() {
					allowed_dirs.push(value);
				}
			}
			"--otel-enabled" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-enabled requires a value"))?;
				otel_enabled = Some(parse_bool(&value, "--otel-enabled")?);
			}
			"--otel-endpoint" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-endpoint requires a value"))?;
				otel_endpoint = Some(value);
			}
			"--otel-service-name" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-service-name requires a value"))?;
				otel_service_name = Some(value);
			}
			"-h" | "--help" => return Err(HelpRequested.into()),
			_ if arg.starts_with("--") => return Err(anyhow!("unknown argument: {}\n{}", arg, USAGE)),
			_ => allowed_dirs.push(arg),
		}
	}
	if let Some(env_roots) = env("MCP_ALLOWED_ROOTS") {
		for value in env_roots.split(',') {
			let trimmed = value.trim();
			if !trimmed.is_empty() {
				allowed_dirs.push(trimmed.to_string());
			}
		}
	}
	if otel_enabled.is_none() {
		if let Some(value) = env("MCP_OTEL_ENABLED").filter(|value| !value.trim().is_empty()) {
			otel_enabled = Some(parse_bool(&value, "MCP_OTEL_ENABLED")?);
		}
	}
	if otel_endpoint.is_none() {
		otel_endpoint = env("MCP_OTEL_ENDPOINT").filter(|value| !value.trim().is_empty());
	}
	if otel_service_name.is_none() {
		otel_service_name = env("MCP_OTEL_SERVICE_NAME").filter(|value| !value.trim().is_empty());
	}
	Ok(Config {
		allowed_dirs,
		otel_enabled: otel_enabled.unwrap_or(true),
		otel_endpoint: otel_endpoint.unwrap_or_else(|| String::from("http://127.0.0.1:4317")),
		otel_service_name: otel_service_name.unwrap_or_else(|| String::from("mcp-sandbox-fs")),
		session_id: uuid::Uuid::new_v4().to_string(),
	})
}

fn parse_bool(value: &str, label: &str) -> Result<bool> {
	let value = value.trim().to_lowercase();
	match value.as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(anyhow!("{} must be a boolean", label)),
	}
}

/// Logs go to stderr; stdout carries the protocol.
pub fn init_tracing(config: &Config) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let fmt_layer = tracing_subscriber::fmt::layer()
		.with_target(false)
		.with_writer(std::io::stderr);
	let subscriber = tracing_subscriber::registry()
		.with(filter)
		.with(fmt_layer);
	#[cfg(feature = "otel")]
	{
		subscriber.with(otel::layer(config)).init();
	}
	#[cfg(not(feature = "otel"))]
	{
		let _ = config;
		subscriber.init();
	}
}

pub fn shutdown_tracing() {
	#[cfg(feature = "otel")]
	opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "otel")]
mod otel {
	use super::Config;
	use opentelemetry::global;
	use opentelemetry::trace::TracerProvider as _;
	use opentelemetry::KeyValue;
	use opentelemetry_otlp::WithExportConfig;
	use opentelemetry_sdk::resource::Resource;
	use opentelemetry_sdk::trace as sdktrace;
	use opentelemetry_semantic_conventions::resource as semconv;
	use tracing_opentelemetry::OpenTelemetryLayer;
	use tracing_subscriber::registry::LookupSpan;

	pub fn layer<S>(config: &Config) -> Option<OpenTelemetryLayer<S, sdktrace::Tracer>>
	where
		S: tracing::Subscriber + for<'span> LookupSpan<'span>, {
		if !config.otel_enabled {
			return None;
		}
		let _ = global::set_error_handler(|_| {});
		let resource = Resource::new(
			vec![
			KeyValue::new(semconv::SERVICE_NAME, config.otel_service_name.clone()),
			KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
			KeyValue::new("mcp.session_id", config.session_id.clone()),
			]
		);
		let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(config.otel_endpoint.clone());
		let provider = opentelemetry_otlp::new_pipeline()
			.tracing()
			.with_exporter(exporter)
			.with_trace_config(sdktrace::Config::default().with_resource(resource))
			.install_batch(opentelemetry_sdk::runtime::Tokio)
			.ok()?;
		let tracer = provider.tracer(config.otel_service_name.clone());
		global::set_tracer_provider(provider);
		Some(OpenTelemetryLayer::new(tracer))
	}
}

pub async fn run(config: Config) -> Result<()> {
	let roots = config.allowed_roots()?;
	info!(
		session_id = %config.session_id,
		roots = ?roots.dirs().collect::<Vec<_>>(),
		"mcp-sandbox-fs listening on stdio"
	);
	let stdin = io::stdin();
	let stdout = io::stdout();
	let mut reader = BufReader::new(stdin).lines();
	let mut writer = io::BufWriter::new(stdout);
	while let Some(line) = reader.next_line().await? {
		if line.trim().is_empty() {
			continue;
		}
		let req: Request = match serde_json::from_str(&line) {
			Ok(req) => req,
			Err(err) => {
				let resp = Response::err(Value::Null, PARSE_ERROR, err.to_string());
				write_response(&mut writer, resp).await?;
				continue;
			}
		};
		if let Some(resp) = handle_request(&config, &roots, req).await {
			write_response(&mut writer, resp).await?;
		}
	}
	info!("stdin closed, shutting down");
	Ok(())
}

async fn handle_request(config: &Config, roots: &AllowedRoots, req: Request) -> Option<Response> {
	let Some(id) = req.id.clone() else {
		debug!(method = %req.method, "notification ignored");
		return None;
	};
	let tool_name = if req.method == "tools/call" {
		req.params
			.get("name")
			.and_then(Value::as_str)
	}
	else {
		None
	};
	let span = info_span!(
		"mcp.request",
		"mcp.session_id" = %config.session_id,
		"mcp.method" = %req.method,
		"mcp.tool_name" = tool_name.unwrap_or(""),
		"mcp.is_error" = tracing::field::Empty,
		"mcp.error_code" = tracing::field::Empty,
	);
	let outcome = route(roots, &req)
		.instrument(span.clone())
		.await;
	let resp = match outcome {
		Ok(value) => {
			record_result(&span, &value);
			Response::ok(id, value)
		}
		Err(err) => {
			if let Some(protocol) = err.downcast_ref::<ProtocolError>() {
				Response::err(id, protocol.code, protocol.message.clone())
			}
			else {
				Response::err(id, -32000, err.to_string())
			}
		}
	};
	Some(resp)
}

async fn route(roots: &AllowedRoots, req: &Request) -> Result<Value> {
	match req.method.as_str() {
		"initialize" => {
			let version = req.params
				.get("protocolVersion")
				.and_then(Value::as_str)
				.unwrap_or(DEFAULT_PROTOCOL_VERSION);
			Ok(json!({
				"protocolVersion": version,
				"serverInfo": {
					"name": "mcp-sandbox-fs",
					"version": env!("CARGO_PKG_VERSION")
				},
				"capabilities": {
					"tools": {}
				}
			}))
		}
		"ping" => Ok(json!({})),
		"tools/list" => Ok(json!({
			"tools": tools::tool_definitions(),
		})),
		"tools/call" => {
			let name = req.params
				.get("name")
				.and_then(Value::as_str)
				.ok_or_else(|| ProtocolError::new(INVALID_PARAMS, "name is required"))?;
			if !tools::is_known(name) {
				return Err(ProtocolError::new(METHOD_NOT_FOUND, format!("unknown tool: {}", name)).into());
			}
			let arguments = req.params
				.get("arguments")
				.cloned()
				.unwrap_or_else(|| json!({}));
			let result = match tools::execute_tool(roots, name, arguments).await {
				Ok(text) => tools::tool_success(text),
				Err(err) => {
					debug!(tool = name, error = %err, "tool call failed");
					tools::tool_error(&err)
				}
			};
			Ok(result)
		}
		_ => Err(ProtocolError::new(METHOD_NOT_FOUND, "method not found").into()),
	}
}

fn record_result(span: &Span, result: &Value) {
	let is_error = result.get("isError")
		.and_then(Value::as_bool)
		.unwrap_or(false);
	span.record("mcp.is_error", is_error);
	if let Some(code) = result.get("structuredContent")
		.and_then(|value| value.get("code"))
		.and_then(Value::as_str) {
		span.record("mcp.error_code", code);
	}
}

async fn write_response(writer: &mut io::BufWriter<io::Stdout>, resp: Response) -> Result<()> {
	let line = serde_json::to_string(&resp)?;
	writer.write_all(line.as_bytes()).await?;
	writer.write_all(b"\n").await?;
	writer.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn args(values: &[&str]) -> Vec<String> {
		values.iter()
			.map(|value| value.to_string())
			.collect()
	}

	#[test]
	fn positional_and_flag_roots_are_collected() {
		let config = parse_config(args(&["/a", "--allow-root", "/b", "/c"]), |_| None).expect("config");
		assert_eq!(config.allowed_dirs, vec!["/a", "/b", "/c"]);
		assert!(config.otel_enabled);
		assert_eq!(config.otel_service_name, "mcp-sandbox-fs");
	}

	#[test]
	fn env_adds_roots_and_fills_unset_options() {
		let config = parse_config(
			args(&["/a", "--otel-enabled", "false"]),
			|key| match key {
				"MCP_ALLOWED_ROOTS" => Some(" /b , ,/c".to_string()),
				"MCP_OTEL_ENABLED" => Some("true".to_string()),
				"MCP_OTEL_ENDPOINT" => Some("http://collector:4317".to_string()),
				_ => None,
			}
		).expect("config");
		assert_eq!(config.allowed_dirs, vec!["/a", "/b", "/c"]);
		assert!(!config.otel_enabled);
		assert_eq!(config.otel_endpoint, "http://collector:4317");
	}

	#[test]
	fn help_is_reported_to_the_caller() {
		let err = parse_config(args(&["/a", "--help"]), |_| None).expect_err("help");
		assert!(err.is::<HelpRequested>());
		assert!(err.to_string().starts_with("Usage: mcp-sandbox-fs"));
	}

	#[test]
	fn unknown_flag_is_fatal() {
		let err = parse_config(args(&["--root", "/a"]), |_| None).expect_err("unknown flag");
		assert!(err.to_string().contains("unknown argument: --root"));
	}

	#[test]
	fn missing_roots_are_fatal() {
		let config = parse_config(Vec::new(), |_| None).expect("config");
		assert!(config.allowed_roots().is_err());
		let config = parse_config(args(&["/definitely/not/here"]), |_| None).expect("config");
		assert!(config.allowed_roots().is_err());
	}

	#[tokio::test]
	async fn unknown_method_and_tool_are_protocol_errors() {
		let dir = tempfile::tempdir().expect("tempdir");
		let roots = AllowedRoots::from_dirs([dir.path()]).expect("roots");
		let req: Request = serde_json::from_value(json!({ "id": 1, "method": "nope" })).expect("request");
		let err = route(&roots, &req).await.expect_err("unknown method");
		assert_eq!(err.downcast_ref::<ProtocolError>().map(|err| err.code), Some(METHOD_NOT_FOUND));
		let req: Request = serde_json::from_value(json!({
			"id": 2,
			"method": "tools/call",
			"params": { "name": "rm_rf", "arguments": {} }
		})).expect("request");
		let err = route(&roots, &req).await.expect_err("unknown tool");
		assert_eq!(err.downcast_ref::<ProtocolError>().map(|err| err.code), Some(METHOD_NOT_FOUND));
	}
}
