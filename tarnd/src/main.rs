mod args;
mod config;
mod daemon;

fn main() {
    let config = args::parse();
    tarn_core::log::init_logger(&config.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build");
    if let Err(err) = runtime.block_on(daemon::start_daemon(config)) {
        eprintln!("tarnd: {err}");
        std::process::exit(1);
    }
}
