use clap::ArgMatches;
use clap_complete::{generate, Shell};
use dexverify::prelude::*;
use dexverify::{cli, dv_dump, dv_locks, dv_verify};
use std::io;

fn main() -> DvResult<()> {
    let args = cli::dexverify().get_matches();

    match &args.subcommand() {
        Some(("verify", cmd_args)) => dv_verify::run(cmd_args),
        Some(("locks", cmd_args)) => dv_locks::run(cmd_args),
        Some(("dump", cmd_args)) => dv_dump::run(cmd_args),
        Some(("gen-completions", sub_args)) => subcommand_gen_completions(sub_args),
        Some((subcommand, _)) => Err(DvError::BadArguments(format!(
            "unknown subcommand '{subcommand}'"
        ))),
        None => Err(DvError::BadArguments("missing subcommand".to_string())),
    }
}

fn subcommand_gen_completions(sub_args: &ArgMatches) -> DvResult<()> {
    let generator = *sub_args
        .get_one::<Shell>("shell")
        .ok_or_else(|| DvError::BadArguments("--shell needed".to_string()))?;
    let mut cmd = cli::dexverify();
    let cmd_name = cmd.get_name().to_string();
    generate(generator, &mut cmd, cmd_name, &mut io::stdout());
    Ok(())
}
