// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use varsync_client::{ConfigSnapshot, VarsyncClient, VarsyncEnv};

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
pub async fn main() {
    let env = VarsyncEnv::from_os_env();
    let log_level = env.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let Some(token) = env.access_token.as_deref() else {
        error!("VARSYNC_ACCESS_TOKEN is not set, exiting");
        return;
    };
    let config = env.to_sync_config();
    let client = match env.environment.as_deref() {
        Some(environment) => VarsyncClient::with_environment(token, environment, config),
        None => VarsyncClient::new(token, config),
    };
    let client = match client {
        Ok(client) => client,
        Err(err) => {
            error!("could not create varsync client: {err}");
            return;
        }
    };

    let mut updates = client.subscribe();
    if let Err(err) = client.init().await {
        error!("varsync init failed: {err}");
        return;
    }
    info!(state = %client.state(), "varsync-watch running");

    match updates.borrow_and_update().as_deref() {
        Some(snapshot) => report(snapshot),
        None => debug!(status = %client.status().to_json(), "waiting for first snapshot"),
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(snapshot) = updates.borrow_and_update().as_deref() {
                    report(snapshot);
                }
            }
        }
    }

    client.shutdown();
    info!(status = %client.status().to_json(), "varsync-watch stopped");
}

fn report(snapshot: &ConfigSnapshot) {
    let mut keys: Vec<&String> = snapshot.keys().collect();
    keys.sort();
    info!(keys = snapshot.len(), "config snapshot changed");
    for key in keys {
        if let Some(value) = snapshot.get(key) {
            info!("  {key} = {value}");
        }
    }
}
