#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let code = ptyspawn::runner::run().await?;

    // Exit here rather than returning: dropping the runtime would wait on
    // the blocking stdin reader.
    use std::io::{self, Write};
    let _ = io::stderr().flush();
    let _ = io::stdout().flush();
    std::process::exit(code);
}
