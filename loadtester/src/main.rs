use core::error::Error;

use clap::Parser;
use loadtester::{cfg::Config, cmd::Cmd, runtime::Runtime};
use tokio::runtime::Builder;

pub fn main() {
    let cmd = Cmd::parse();
    if let Err(err) = loadtester::logging::init(cmd.verbose as usize) {
        eprintln!("ERROR: failed to initialize logging: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(cmd) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn run(cmd: Cmd) -> Result<(), Box<dyn Error>> {
    let cfg: Config = cmd.try_into()?;

    Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .thread_name("loadtester:w")
        .build()?
        .block_on(async {
            let report = Runtime::new(cfg).run().await?;
            log::info!("summary:\n{report}");

            Ok::<(), Box<dyn Error>>(())
        })
}
