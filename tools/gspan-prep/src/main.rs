use structopt::StructOpt;
use anyhow::Result;
use gspan_prep::{execute, init_tracing, Opt};

fn main() -> Result<()> {
    let opt = Opt::from_args();
    init_tracing(opt.verbose);
    execute(&opt)
}
