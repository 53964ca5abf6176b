use dexverify::prelude::DvResult;
use dexverify::{cli, dv_dump};

fn main() -> DvResult<()> {
    let args = cli::dump().get_matches();
    dv_dump::run(&args)
}
