use dexverify::prelude::DvResult;
use dexverify::{cli, dv_locks};

fn main() -> DvResult<()> {
    let args = cli::locks().get_matches();
    dv_locks::run(&args)
}
