//! Binary entry point for the `fleeting-plugin-cloudscale` operator CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleeting_plugin_cloudscale::credentials::store_private_key;
use fleeting_plugin_cloudscale::{
    CloudscaleClient, CloudscaleError, ConfigLoadError, ConnectInfo, ConnectorConfig,
    ConnectorSettings, CredentialError, GroupConfig, GroupError, InstanceGroup, Provider, State,
    VersionInfo,
};

mod cli;

use cli::{Cli, GroupArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Group(#[from] GroupError<CloudscaleError>),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(
        "no private key configured: set FLEETING_CONNECTOR_KEY_PATH or pass --key-out \
         so that new servers stay reachable"
    )]
    KeyRequired,
    #[error("{0}")]
    Batch(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let exit_code = match dispatch(cli, &cancel).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    match cli {
        Cli::Version => {
            writeln!(stdout, "{}", VersionInfo::from_build_env()).ok();
            Ok(())
        }
        Cli::Status(args) => {
            let group = open_group(&args, cancel).await?;
            let mut lines = Vec::new();
            group
                .update(cancel, &mut |id: &str, state: State| {
                    lines.push(format!("{id} {state}"));
                })
                .await?;
            for line in lines {
                writeln!(stdout, "{line}").ok();
            }
            Ok(())
        }
        Cli::Increase {
            group: args,
            count,
            key_out,
        } => increase(&args, count, key_out.as_deref(), cancel).await,
        Cli::Decrease { group: args, ids } => {
            let group = open_group(&args, cancel).await?;
            let outcome = group.decrease(cancel, &ids).await?;
            for id in &outcome.succeeded {
                writeln!(stdout, "deleted {id}").ok();
            }
            outcome
                .error()
                .map_or(Ok(()), |errors| Err(CliError::Batch(errors.to_string())))
        }
        Cli::ConnectInfo { group: args, id } => {
            let group = open_group(&args, cancel).await?;
            let info = group.connect_info(cancel, &id).await?;
            write_connect_info(&mut stdout, &info);
            Ok(())
        }
    }
}

async fn increase(
    args: &GroupArgs,
    count: usize,
    key_out: Option<&str>,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    let (config, settings) = load_sources(args)?;
    let generated = settings.key.is_none();
    if generated && key_out.is_none() {
        return Err(CliError::KeyRequired);
    }

    let group = init_group(config, settings, cancel).await?;
    if let (true, Some(path)) = (generated, key_out) {
        let key = group
            .settings()
            .and_then(|settings| settings.key.as_deref())
            .unwrap_or_default();
        store_private_key(Utf8Path::new(path), key)?;
        info!(path, "generated private key written");
    }

    let outcome = group.increase(cancel, count).await?;
    writeln!(io::stdout(), "created {} of {count} servers", outcome.succeeded).ok();
    outcome
        .error()
        .map_or(Ok(()), |errors| Err(CliError::Batch(errors.to_string())))
}

async fn open_group(
    args: &GroupArgs,
    cancel: &CancellationToken,
) -> Result<InstanceGroup<CloudscaleClient>, CliError> {
    let (config, settings) = load_sources(args)?;
    init_group(config, settings, cancel).await
}

fn load_sources(args: &GroupArgs) -> Result<(GroupConfig, ConnectorSettings), CliError> {
    let config = GroupConfig::load(Utf8Path::new(&args.config))?;
    let settings = ConnectorConfig::load_without_cli_args()?.into_settings()?;
    Ok((config, settings))
}

async fn init_group(
    config: GroupConfig,
    settings: ConnectorSettings,
    cancel: &CancellationToken,
) -> Result<InstanceGroup<CloudscaleClient>, CliError> {
    let mut group = InstanceGroup::new(config, VersionInfo::from_build_env());
    group.init(cancel, settings).await?;
    Ok(group)
}

fn write_connect_info(mut target: impl Write, info: &ConnectInfo) {
    writeln!(target, "id: {}", info.id).ok();
    writeln!(target, "os: {}", info.os).ok();
    writeln!(target, "arch: {}", info.arch).ok();
    writeln!(target, "protocol: {}", info.protocol).ok();
    writeln!(target, "username: {}", info.username).ok();
    writeln!(target, "external_addr: {}", info.external_addr).ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
