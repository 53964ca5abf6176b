//! Main `dexverify` binary command line arguments options.
//!
//! This module declares a function to build `clap` command line arguments
//! parser, so that it can be used from other places than the main binary,
//! such as from bash completion file generator.

use clap::{value_parser, Arg, ArgAction, Command};
use clap_complete::Shell;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn arg_debug() -> Arg {
    Arg::new("debug")
        .short('d')
        .long("debug")
        .action(ArgAction::SetTrue)
        .help("Activate debug mode")
}

fn arg_verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Activate verbose mode")
}

fn arg_ecslog() -> Arg {
    Arg::new("ecslog")
        .short('e')
        .long("ecslog")
        .action(ArgAction::SetTrue)
        .help("Output logs in ECS format")
}

fn arg_input() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .action(ArgAction::Set)
        .required(true)
        .help("Input dex model file (JSON)")
}

fn arg_system() -> Arg {
    Arg::new("system")
        .short('s')
        .long("system")
        .action(ArgAction::Set)
        .help("Additional system/core/api dex model file")
}

fn arg_filter_class() -> Arg {
    Arg::new("filter-class")
        .long("filter-class")
        .action(ArgAction::Set)
        .help("Class(es) regex filter")
}

fn arg_filter_method() -> Arg {
    Arg::new("filter-method")
        .long("filter-method")
        .action(ArgAction::Set)
        .help("Method(s) regex filter")
}

fn arg_class() -> Arg {
    Arg::new("class")
        .short('c')
        .long("class")
        .action(ArgAction::Set)
        .required(true)
        .help("Class descriptor, as in Lcom/example/Foo;")
}

fn arg_method() -> Arg {
    Arg::new("method")
        .short('m')
        .long("method")
        .action(ArgAction::Set)
        .required(true)
        .help("Method name, optionally followed by its prototype, as in run(I)V")
}

fn arg_api_level() -> Arg {
    Arg::new("api-level")
        .long("api-level")
        .action(ArgAction::Set)
        .value_parser(value_parser!(u32))
        .help("Target API level")
}

fn arg_aot() -> Arg {
    Arg::new("aot")
        .long("aot")
        .action(ArgAction::SetTrue)
        .help("Verify as the ahead-of-time compiler does")
}

#[must_use]
pub fn dexverify() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(DESCRIPTION)
        .subcommand(verify())
        .subcommand(locks())
        .subcommand(dump())
        .subcommand(
            Command::new("gen-completions")
                .about("Generates completions file")
                .arg(
                    Arg::new("shell")
                        .short('s')
                        .long("shell")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(Shell))
                        .required(true)
                        .help("Shell type for completion generation"),
                ),
        )
}

#[must_use]
pub fn verify() -> Command {
    Command::new("verify")
        .bin_name("dv-verify")
        .version(VERSION)
        .author(AUTHORS)
        .about("Verifies the bytecode of every method")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_system())
        .arg(arg_filter_class())
        .arg(arg_filter_method())
        .arg(arg_aot())
        .arg(arg_api_level())
        .arg(
            Arg::new("parallel")
                .short('j')
                .long("parallel")
                .action(ArgAction::SetTrue)
                .help("Verify methods in parallel"),
        )
}

#[must_use]
pub fn locks() -> Command {
    Command::new("locks")
        .bin_name("dv-locks")
        .version(VERSION)
        .author(AUTHORS)
        .about("Prints the monitors held at a dex pc of a method")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_system())
        .arg(arg_class())
        .arg(arg_method())
        .arg(
            Arg::new("pc")
                .short('p')
                .long("pc")
                .action(ArgAction::Set)
                .required(true)
                .help("Dex pc, decimal or 0x-prefixed hexadecimal"),
        )
}

#[must_use]
pub fn dump() -> Command {
    Command::new("dump")
        .bin_name("dv-dump")
        .version(VERSION)
        .author(AUTHORS)
        .about("Prints the failures and register lines of a method verification")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_system())
        .arg(arg_class())
        .arg(arg_method())
        .arg(arg_aot())
        .arg(arg_api_level())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands() {
        dexverify().debug_assert();
    }

    #[test]
    fn locks_arguments() {
        let args = locks()
            .try_get_matches_from([
                "dv-locks", "-i", "app.json", "-c", "LFoo;", "-m", "run", "--pc", "0x4",
            ])
            .unwrap();
        assert_eq!(args.get_one::<String>("pc").map(String::as_str), Some("0x4"));
        assert!(locks()
            .try_get_matches_from(["dv-locks", "-i", "app.json"])
            .is_err());
    }
}
