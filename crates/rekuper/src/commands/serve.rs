use rekuper_core::config::Settings;
use rekuper_store::Store;
use std::path::Path;
use std::sync::Arc;

pub fn run(config: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;
    let db_path = settings.db_path();
    let listen_addr = settings.listen_addr();

    // Open the database before binding so a bad path fails at startup
    let store = Arc::new(Store::open(Path::new(&db_path))?);
    println!("Serving record store on {listen_addr} (db: {db_path})");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(rekuper_store::http::serve(store, &listen_addr))?;
    Ok(())
}
