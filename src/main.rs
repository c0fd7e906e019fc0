#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gradeflow::run().await {
        eprintln!("gradeflow fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
