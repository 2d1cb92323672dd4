use anyhow::Result;
use mcp_sandbox_fs::server::{self, HelpRequested};

#[tokio::main]
async fn main() -> Result<()> {
	let config = match server::load_config() {
		Ok(config) => config,
		Err(err) if err.is::<HelpRequested>() => {
			eprintln!("{}", err);
			return Ok(());
		}
		Err(err) => return Err(err),
	};
	server::init_tracing(&config);
	let result = server::run(config).await;
	server::shutdown_tracing();
	result
}
