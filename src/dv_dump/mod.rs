use crate::dv_verify::verify_options;
use crate::owndex::{find_input_method, open_repo};
use crate::prelude::*;
use clap::ArgMatches;

pub fn run(args: &ArgMatches) -> DvResult<()> {
    init_logger(args);

    let (repo, input) = open_repo(args)?;
    let class = args
        .get_one::<String>("class")
        .ok_or_else(|| DvError::BadArguments("--class needed".to_string()))?;
    let method = args
        .get_one::<String>("method")
        .ok_or_else(|| DvError::BadArguments("--method needed".to_string()))?;
    let options = VerifyOptions {
        log_hard_failures: false,
        ..verify_options(args)
    };

    let (dex, class_def, encoded) = find_input_method(&input, class, method)?;
    let (verification, listing) = dump_method(&repo, dex, class_def, encoded, &options)?;
    println!("{}: {}", verification.method, verification.data.kind);
    for failure in &verification.failures {
        println!("  {} {}", failure.kind, failure.message);
    }
    if !verification.runtime_throw_pcs.is_empty() {
        let pcs: Vec<String> = verification
            .runtime_throw_pcs
            .iter()
            .map(|pc| format!("0x{pc:04x}"))
            .collect();
        println!("throwing at runtime: {}", pcs.join(", "));
    }
    print!("{listing}");
    Ok(())
}
