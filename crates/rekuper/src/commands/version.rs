pub fn run() -> anyhow::Result<()> {
    println!("rekuper {}", env!("CARGO_PKG_VERSION"));
    println!("Test resource session tracker and metrics shovel");
    Ok(())
}
