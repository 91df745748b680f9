//! Main entry point for the order bridge service.
//!
//! `bridge serve` runs the HTTP server; `bridge init` creates the
//! database schema and a default administrator account.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use bridge_config::Config;
use bridge_server::{bootstrap, server};

/// Command-line arguments for the bridge service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the HTTP server (default)
	Serve,
	/// Create the schema and a default administrator
	Init {
		/// Administrator username
		#[arg(long, default_value = "admin")]
		username: String,
		/// Administrator password
		#[arg(long, default_value = "admin123")]
		password: String,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string()));
	fmt().with_env_filter(env_filter).with_target(true).init();

	let config = Config::from_file(args.config.to_str().unwrap_or("config.toml"))?;
	tracing::info!("Loaded configuration [{}]", config.bridge.id);

	let store = Arc::new(bootstrap::build_store(&config)?);

	match args.command.unwrap_or(Command::Serve) {
		Command::Init { username, password } => {
			store.backend().init_schema().await?;
			store.backend().ensure_admin_user(&username, &password).await?;
			tracing::info!("schema created, administrator '{}' ensured", username);
		}
		Command::Serve => {
			// Schema creation is idempotent; running it here keeps fresh
			// deployments working without a separate init step.
			store.backend().init_schema().await?;

			let state = bootstrap::build_state(&config, Arc::clone(&store))?;
			tracing::info!("Starting order bridge");
			server::start_server(&config, state).await?;
			tracing::info!("Stopped order bridge");
		}
	}

	Ok(())
}
