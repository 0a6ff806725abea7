//! Cluster and secret discovery when none was named on the command line.

use super::sdk_failure;
use anyhow::{bail, Result};
use aws_config::SdkConfig;
use rustyline::DefaultEditor;
use std::io::IsTerminal;

/// Data API enabled clusters visible to the caller.
pub async fn list_clusters(config: &SdkConfig) -> Result<Vec<String>> {
    let client = aws_sdk_rds::Client::new(config);
    let mut pages = client.describe_db_clusters().into_paginator().send();

    let mut cluster_ids = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|err| sdk_failure("Failed to list database clusters", err))?;
        cluster_ids.extend(
            page.db_clusters()
                .iter()
                .filter(|cluster| cluster.http_endpoint_enabled().unwrap_or(false))
                .filter_map(|cluster| cluster.db_cluster_identifier())
                .map(str::to_string),
        );
    }

    Ok(cluster_ids)
}

pub async fn list_secrets(config: &SdkConfig) -> Result<Vec<String>> {
    let client = aws_sdk_secretsmanager::Client::new(config);
    let mut pages = client.list_secrets().into_paginator().send();

    let mut names = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|err| sdk_failure("Failed to list secrets", err))?;
        names.extend(
            page.secret_list()
                .iter()
                .filter_map(|secret| secret.name())
                .map(str::to_string),
        );
    }

    Ok(names)
}

pub async fn select_cluster(config: &SdkConfig) -> Result<String> {
    let cluster_ids = list_clusters(config).await?;
    choose(
        cluster_ids,
        "No Aurora Data API-enabled Database Clusters found",
        "Found only one Aurora Data API-enabled Database Cluster",
        "Which Aurora Data API-enabled Database Cluster?",
    )
    .await
}

pub async fn select_secret(config: &SdkConfig) -> Result<String> {
    let names = list_secrets(config).await?;
    choose(
        names,
        "No secrets found in AWS Secrets Manager",
        "Found only one secret in AWS Secrets Manager",
        "Which secret?",
    )
    .await
}

async fn choose(
    mut choices: Vec<String>,
    none_found: &str,
    only_one: &str,
    question: &str,
) -> Result<String> {
    match choices.len() {
        0 => bail!("{}", none_found),
        1 => {
            let only = choices.remove(0);
            println!("{}: {}", only_one, only);
            Ok(only)
        }
        _ if !std::io::stdin().is_terminal() => {
            bail!(
                "Cannot ask \"{}\" without a terminal; choices: {}",
                question,
                choices.join(", ")
            )
        }
        _ => {
            let question = question.to_string();
            tokio::task::spawn_blocking(move || prompt_choice(&question, &choices)).await?
        }
    }
}

fn prompt_choice(question: &str, choices: &[String]) -> Result<String> {
    let mut editor = DefaultEditor::new()?;

    println!("{}", question);
    for (i, choice) in choices.iter().enumerate() {
        println!("  {}) {}", i + 1, choice);
    }

    loop {
        let answer = editor.readline(&format!("[1-{}]: ", choices.len()))?;
        match parse_choice(&answer, choices) {
            Some(choice) => return Ok(choice.to_string()),
            None => println!("Enter a number between 1 and {} or a name", choices.len()),
        }
    }
}

/// Accepts a 1-based index or an exact name.
pub fn parse_choice<'a>(answer: &str, choices: &'a [String]) -> Option<&'a str> {
    let answer = answer.trim();
    if let Ok(n) = answer.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| choices.get(i))
            .map(String::as_str);
    }
    choices
        .iter()
        .find(|choice| choice.as_str() == answer)
        .map(String::as_str)
}
