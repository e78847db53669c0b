use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use wiki_authenticator::cli::{self, Cli, Services};
use wiki_authenticator::config::AuthenticatorConfig;
use wiki_authenticator::error::AuthenticatorError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = AuthenticatorConfig::load_logged(&cli.config, std::io::stderr);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli, &config).await {
        Ok(()) => 0,
        // The result bundle has already been printed
        Err(AuthenticatorError::Flow(kind)) => kind.error_code(),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            e.kind().error_code()
        }
    };

    // A pending stdin read would otherwise keep the runtime alive after Ctrl-C.
    std::process::exit(code);
}

async fn run(cli: Cli, config: &AuthenticatorConfig) -> Result<(), AuthenticatorError> {
    let services = Services::open(config)?;
    cli::run(cli, &services).await
}
