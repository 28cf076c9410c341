use std::net::TcpListener;

use anyhow::Context;
use env_logger::Env;
use page_audit::{configuration::get_configuration, services::AuditService, startup::run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().context("Failed to read configuration.")?;
    let audit_service =
        AuditService::new(&configuration.audit).context("Failed to build the HTTP client.")?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    log::info!("Server started at {}", address);

    run(listener, audit_service)?.await?;
    Ok(())
}
