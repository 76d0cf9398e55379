//! Binary entry point for the Ceph RBD driver CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use ceph_rbd_driver::instance::compute_instance_id;
use ceph_rbd_driver::{
    ALLOCATION_UNIT, BlockDeviceApi, BlockDeviceError, CephRbdBlockDeviceApi, ClusterClient,
    CommandRunner, ConfigError, DriverConfig, ProcessBlockDeviceApi, ProcessCommandRunner,
};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] BlockDeviceError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli, &mut io::stdout()) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn dispatch(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    if matches!(cli, Cli::AllocationUnit) {
        writeln!(out, "{ALLOCATION_UNIT}")?;
        return Ok(());
    }

    let config = DriverConfig::load_without_cli_args()?;
    config.validate()?;
    if matches!(cli, Cli::InstanceId) {
        let instance_id = compute_instance_id(&ProcessCommandRunner, &config.hostname_bin)?;
        writeln!(out, "{instance_id}")?;
        return Ok(());
    }

    let driver = ProcessBlockDeviceApi::connect(&config)?;
    let result = execute(&driver, cli, out);
    driver.close();
    result
}

fn execute<C, R>(
    driver: &CephRbdBlockDeviceApi<C, R>,
    cli: Cli,
    out: &mut impl Write,
) -> Result<(), CliError>
where
    C: ClusterClient,
    R: CommandRunner,
{
    match cli {
        Cli::InstanceId => writeln!(out, "{}", driver.compute_instance_id()?)?,
        Cli::AllocationUnit => writeln!(out, "{}", driver.allocation_unit())?,
        Cli::Create(args) => {
            let dataset_id = Uuid::parse_str(&args.dataset_id).map_err(|err| {
                CliError::InvalidArgument(format!("dataset id {}: {err}", args.dataset_id))
            })?;
            write_json(out, &driver.create_volume(dataset_id, args.size)?)?;
        }
        Cli::Destroy(args) => driver.destroy_volume(&args.blockdevice_id)?,
        Cli::Attach(args) => {
            let target = args.to.map_or_else(|| driver.compute_instance_id(), Ok)?;
            if let Some(volume) = driver.attach_volume(&args.blockdevice_id, &target)? {
                write_json(out, &volume)?;
            }
        }
        Cli::Detach(args) => driver.detach_volume(&args.blockdevice_id)?,
        Cli::List => write_json(out, &driver.list_volumes()?)?,
        Cli::DevicePath(args) => {
            writeln!(out, "{}", driver.get_device_path(&args.blockdevice_id)?)?;
        }
        Cli::Sweep => write_json(out, &driver.destroy_all_volumes()?)?,
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
