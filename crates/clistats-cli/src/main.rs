mod cli;
mod logging;
mod render;
mod workload;

fn main() {
    if let Err(e) = cli::run() {
        if e.downcast_ref::<cli::InterruptedError>().is_some() {
            std::process::exit(130);
        }
        eprintln!("{e:#}"); // pretty anyhow chain
        std::process::exit(1);
    }
}
