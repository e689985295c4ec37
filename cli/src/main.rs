//! The `qcache` server binary: parses CLI flags (§6), resolves them
//! against a config file and built-in defaults, then hands off to the HTTP
//! boundary.

use clap::Parser;
use tracing::error;

use qcache_common::config::CliArgs;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = CliArgs::parse();
    let cfg = match args.resolve() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    qcache_common::log::init_logging(cfg.debug);

    eprintln!();
    eprintln!("╔═╗╔═╗╔═╗╔═╗╦ ╦╔═╗");
    eprintln!("║═╬╗║  ╠═╣║  ╠═╣║╣ ");
    eprintln!("╚═╝╚╚═╝╩ ╩╚═╝╩ ╩╚═╝  in-memory queryable cache");
    eprintln!();

    if let Err(err) = qcache_web::run(cfg).await {
        error!(%err, "server exited with an error");
        return Err(err);
    }
    Ok(())
}
