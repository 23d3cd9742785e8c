//! Command handlers

use std::sync::Arc;

use colored::Colorize;
use platform_api::MachineState;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::app::context::CliContext;
use crate::errors::CliError;
use crate::logstream::aggregator;
use crate::logstream::polling::PollingStream;
use crate::logstream::presenter::LogPresenter;
use crate::logstream::LogOptions;
use crate::monitor::deployment::DeploymentMonitor;
use crate::monitor::presenter::ConsoleObserver;
use crate::recipes::operation::{ConsoleProgress, Progress};
use crate::recipes::postgres::{self, RecipeReport};
use crate::recipes::provision::{PostgresProvision, PostgresProvisionConfig};

/// Stream an app's logs until interrupted
pub async fn logs(
    ctx: &CliContext,
    app_name: &str,
    region: Option<String>,
    instance: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let opts = LogOptions {
        app_name: app_name.to_string(),
        region,
        instance,
        max_backoff: None,
    };

    let polling = PollingStream::new(ctx.client(), &opts, ctx.options.log_backoff.clone()).await?;
    let live = Arc::new(ctx.agent().live_logs(&polling.app().organization));

    let mut presenter = LogPresenter::stdout();
    presenter.json = json;

    let outcome = aggregator::run(
        polling,
        live,
        opts,
        ctx.options.aggregator.clone(),
        Arc::new(presenter),
        ctx.cancel_token(),
    )
    .await?;

    match outcome.polling_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Watch deployments until one fails or the user interrupts
pub async fn monitor(ctx: &CliContext, app_name: &str, verbose: bool) -> Result<(), CliError> {
    let client = ctx.client();
    let app = client.get_app(app_name).await?;
    println!("{}", format!("Monitoring deployments for {}", app.name).bold());

    let mut observer = ConsoleObserver::stdout();
    observer.verbose = verbose;

    let mut monitor = DeploymentMonitor::new(client, &app.name, ctx.options.monitor.clone());
    loop {
        match monitor.run(&observer, ctx.cancel_token()).await {
            Ok(outcome) if outcome.success => continue,
            Ok(outcome) => return Err(CliError::DeploymentFailed(outcome.version)),
            Err(CliError::Cancelled) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Print an app's machines
pub async fn list_machines(
    ctx: &CliContext,
    app_name: &str,
    state: Option<MachineState>,
) -> Result<(), CliError> {
    let machines = ctx.client().list_machines(app_name, state).await?;

    println!(
        "{:<16} {:<20} {:<10} {:<8} {:<28} {}",
        "ID".bold(),
        "NAME".bold(),
        "STATE".bold(),
        "REGION".bold(),
        "IMAGE".bold(),
        "ADDRESS".bold()
    );
    for m in &machines {
        println!(
            "{:<16} {:<20} {:<10} {:<8} {:<28} {}",
            m.id,
            m.name,
            m.state,
            m.region,
            m.config.image,
            m.private_ip().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn postgres_reboot(ctx: &CliContext, app_name: &str) -> Result<(), CliError> {
    let session = ctx.open_session(app_name, Arc::new(ConsoleProgress)).await?;
    let report = postgres::postgres_reboot(session).await?;
    print_report(&report);
    println!("{}", format!("Postgres cluster {} rebooted", app_name).green());
    Ok(())
}

pub async fn postgres_upgrade(ctx: &CliContext, app_name: &str, image: &str) -> Result<(), CliError> {
    let session = ctx.open_session(app_name, Arc::new(ConsoleProgress)).await?;
    let report =
        postgres::postgres_upgrade(session, image, ctx.options.machine_wait.clone()).await?;
    print_report(&report);
    for r in &report.replacements {
        println!("Replaced {} with {}", r.old_machine_id, r.new_machine_id);
    }
    println!("{}", format!("Postgres cluster {} upgraded to {}", app_name, image).green());
    Ok(())
}

pub async fn postgres_sql(ctx: &CliContext, app_name: &str, sql: &str) -> Result<(), CliError> {
    let session = ctx.open_session(app_name, Arc::new(ConsoleProgress)).await?;
    let output = postgres::postgres_sql(session, sql).await?;
    println!("{}", output);
    Ok(())
}

/// Inputs for provisioning that come from the command line
#[derive(Debug, Clone)]
pub struct ProvisionArgs {
    pub app_name: String,
    pub org: Option<String>,
    pub region: String,
    pub count: u32,
    pub image: Option<String>,
    pub volume_size_gb: u32,
    pub password: Option<String>,
    pub consul_url: Option<String>,
    pub etcd_url: Option<String>,
}

pub async fn postgres_provision(ctx: &CliContext, args: ProvisionArgs) -> Result<(), CliError> {
    let client = ctx.client();
    let slug = ctx.org_slug(args.org.as_deref())?;
    let organization = client.get_organization(&slug).await?;
    debug!("Provisioning {} in {} ({})", args.app_name, organization.slug, args.region);

    let mut config = PostgresProvisionConfig::new(args.app_name, organization, args.region);
    config.count = args.count;
    config.volume_size_gb = args.volume_size_gb;
    config.password = args.password.map(SecretString::from);
    config.consul_url = args.consul_url;
    config.etcd_url = args.etcd_url;
    if let Some(image) = args.image {
        config.image_ref = image;
    }

    let progress: Arc<dyn Progress> = Arc::new(ConsoleProgress);
    let provision = PostgresProvision::new(config, client, progress, ctx.options.machine_wait.clone());
    let outcome = provision.start(ctx.cancel_token()).await?;

    info!("Provisioned {} machine(s) for {}", outcome.machines.len(), outcome.app.name);
    println!("Connection string: {}", outcome.connection_string.expose_secret());
    Ok(())
}

fn print_report(report: &RecipeReport) {
    let leaders: Vec<&str> = report.roles.leaders().iter().map(|t| t.machine_id.as_str()).collect();
    let replicas: Vec<&str> = report.roles.replicas().iter().map(|t| t.machine_id.as_str()).collect();
    println!("Leader(s): {}", leaders.join(", "));
    println!("Replica(s): {}", replicas.join(", "));
    debug!("Recipe finished in phase {:?}", report.phase);
}
