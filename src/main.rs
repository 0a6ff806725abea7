use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod aws;
mod cli;
mod commands;
mod completion;
mod database;

use cli::{Cli, ShellTarget};
use commands::{FailurePolicy, QueryExecutor, QueueExit};
use completion::KeywordStore;
use database::{DataApi, ExecuteRequest, RdsDataClient};

fn command() -> Command {
    Command::new("adasql")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Interactive SQL shell for Aurora clusters through the RDS Data API")
        .arg(
            Arg::new("cluster")
                .short('c')
                .long("cluster")
                .env("ADASQL_CLUSTER")
                .value_name("CLUSTER_ID")
                .help("Aurora Database Cluster ID (if omitted, picks among Data API-enabled clusters)"),
        )
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .env("ADASQL_PROFILE")
                .value_name("PROFILE")
                .help("AWS profile"),
        )
        .arg(
            Arg::new("region")
                .short('r')
                .long("region")
                .env("ADASQL_REGION")
                .value_name("REGION")
                .help("AWS region"),
        )
        .arg(
            Arg::new("secret")
                .short('s')
                .long("secret")
                .env("ADASQL_SECRET")
                .value_name("SECRET_NAME")
                .help("Secrets Manager secret name (if omitted, picks among available secrets)"),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .env("ADASQL_DATABASE")
                .value_name("DATABASE")
                .help("Initial database to use"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .env("ADASQL_VERBOSE")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
}

fn init_logging(verbose: bool) {
    let default = if verbose { "adasql=debug" } else { "adasql=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = command().get_matches();
    init_logging(matches.get_flag("verbose"));

    match run(&matches).await {
        Ok(QueueExit::Drained) => ExitCode::SUCCESS,
        Ok(QueueExit::Aborted) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<QueueExit> {
    let arg = |name: &str| matches.get_one::<String>(name).cloned();
    let database = arg("database");

    match arg("profile") {
        Some(profile) => println!("Using AWS Profile: {}", profile),
        None => println!("Using AWS Credentials: From local environment"),
    }
    match arg("region") {
        Some(region) => println!("Using AWS Region: {}", region),
        None => println!("Using AWS Region: From local environment"),
    }

    let sdk_config = aws::load_config(arg("profile").as_deref(), arg("region").as_deref()).await;
    let aws_info = aws::caller_identity(&sdk_config).await?;

    println!("AWS Account: {}", aws_info.account_id);
    println!("AWS Region: {}", aws_info.region);
    println!("AWS User: {}", aws_info.user_name());
    println!(
        "AWS Account Alias: {}",
        aws_info.account_alias.as_deref().unwrap_or("(none)")
    );

    let cluster_id = match arg("cluster") {
        Some(cluster_id) => cluster_id,
        None => aws::select_cluster(&sdk_config).await?,
    };
    let secret_name = match arg("secret") {
        Some(secret_name) => secret_name,
        None => aws::select_secret(&sdk_config).await?,
    };

    println!("Connecting with the following configuration:");
    println!("  RDS Aurora Cluster ID: {}", cluster_id);
    println!("  Secrets Manager Secret Name: {}", secret_name);
    println!("  Database: {}", database.as_deref().unwrap_or("(none)"));

    let api: Arc<dyn DataApi> = Arc::new(RdsDataClient::new(
        &sdk_config,
        aws_info.cluster_arn(&cluster_id),
        aws_info.secret_arn(&secret_name),
    ));

    api.execute_statement(ExecuteRequest::new("SELECT 1;").database(database.as_deref()))
        .await
        .context("Failed to connect to the database cluster")?;
    info!(%cluster_id, "connected");

    let keywords = KeywordStore::new();
    keywords.refresh(api.clone(), database.clone()).await;

    let interactive = std::io::stdin().is_terminal();
    let policy = if interactive {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort
    };

    let executor = QueryExecutor::new(api, keywords.clone(), database, policy);
    let session = executor.subscribe();
    let (queue, handle) = executor.spawn();

    let target = ShellTarget {
        cluster_id,
        secret_name,
    };

    tokio::task::spawn_blocking(move || -> Result<()> {
        if interactive {
            let mut cli = Cli::new(keywords, queue, session, target)?;
            cli.run()
        } else {
            cli::run_script(std::io::stdin().lock(), &queue, |text| println!("{}", text))
        }
    })
    .await??;

    Ok(handle.await?)
}
