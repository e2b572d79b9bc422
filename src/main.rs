use std::process;

#[tokio::main]
async fn main() {
    if let Err(err) = duet::cli::run().await {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
