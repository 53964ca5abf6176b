use dexverify::prelude::DvResult;
use dexverify::{cli, dv_verify};

fn main() -> DvResult<()> {
    let args = cli::verify().get_matches();
    dv_verify::run(&args)
}
