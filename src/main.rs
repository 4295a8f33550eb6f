#[tokio::main]
async fn main() {
    let code = qrelay::app::startup::startup().await;
    if code != 0 {
        std::process::exit(code);
    }
}
