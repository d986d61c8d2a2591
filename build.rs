//! Build script rendering the `armada` manual pages.
//!
//! Writes `armada.1` plus one `armada-<subcommand>.1` page for `provision`,
//! `describe`, `instances`, and `zones` into `OUT_DIR`, all derived from the
//! clap definitions shared with the binary.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: Command, target: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    Man::new(command).render(&mut buffer)?;
    fs::write(target, buffer)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let command = Cli::command();
    for subcommand in command.get_subcommands() {
        let name = format!("armada-{}", subcommand.get_name());
        let page = subcommand.clone().name(name.clone());
        render(page, &out_dir.join(format!("{name}.1")))?;
    }
    render(command, &out_dir.join("armada.1"))
}
