use crate::owndex::{find_input_method, open_repo};
use crate::prelude::*;
use clap::ArgMatches;

fn parse_pc(pc: &str) -> DvResult<u32> {
    let parsed = match pc.strip_prefix("0x").or_else(|| pc.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => pc.parse(),
    };
    parsed.map_err(|err| DvError::BadArguments(format!("invalid dex pc '{pc}': {err}")))
}

pub fn run(args: &ArgMatches) -> DvResult<()> {
    init_logger(args);

    let (repo, input) = open_repo(args)?;
    let class = args
        .get_one::<String>("class")
        .ok_or_else(|| DvError::BadArguments("--class needed".to_string()))?;
    let method = args
        .get_one::<String>("method")
        .ok_or_else(|| DvError::BadArguments("--method needed".to_string()))?;
    let dex_pc = parse_pc(
        args.get_one::<String>("pc")
            .ok_or_else(|| DvError::BadArguments("--pc needed".to_string()))?,
    )?;

    let (dex, class_def, encoded) = find_input_method(&input, class, method)?;
    let locks = find_locks_at_dex_pc(&repo, dex, class_def, encoded, dex_pc)?;
    if locks.is_empty() {
        println!("no monitor held at 0x{dex_pc:04x}");
    }
    for lock in &locks {
        let registers: Vec<String> = lock.dex_registers.iter().map(|r| format!("v{r}")).collect();
        println!(
            "monitor-enter at 0x{:04x}, held in {}",
            lock.dex_pc,
            registers.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dex_pcs() {
        assert_eq!(parse_pc("12").unwrap(), 12);
        assert_eq!(parse_pc("0x1f").unwrap(), 31);
        assert!(matches!(parse_pc("pc"), Err(DvError::BadArguments(_))));
    }
}
