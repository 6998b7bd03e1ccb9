use rekuper_core::config::Settings;
use std::path::Path;

pub fn run(config: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(rekuper_shovel::run(&settings))?;

    println!("Ingestion finished:");
    println!("  batches:         {}", summary.batches);
    println!("  empty batches:   {}", summary.empty_batches);
    println!("  failed batches:  {}", summary.failed_batches);
    println!("  records pushed:  {}", summary.pushed);
    println!("  records skipped: {}", summary.skipped);
    Ok(())
}
