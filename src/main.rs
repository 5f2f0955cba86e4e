mod cli;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn report(result: anyhow::Result<()>) {
    if let Err(err) = result {
        eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
        std::process::exit(1);
    }
}

#[cfg(feature = "server")]
#[tokio::main]
async fn main() {
    init_logging();
    report(cli::dispatch().await);
}

#[cfg(not(feature = "server"))]
fn main() {
    init_logging();
    report(cli::dispatch_sync());
}
