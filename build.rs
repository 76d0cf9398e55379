//! Renders `ceph-rbd-driver.1` into `OUT_DIR` from the same clap definition
//! the binary parses, so the documented subcommands never drift from the
//! ones a storage node accepts.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let command = Cli::command();
    let page = out_dir.join(format!("{}.1", command.get_name()));
    let mut buffer = Vec::new();
    Man::new(command).render(&mut buffer)?;
    File::create(page)?.write_all(&buffer)?;

    Ok(())
}
