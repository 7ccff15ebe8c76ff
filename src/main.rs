use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = director::cli::Cli::parse();
    if let Err(e) = director::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
