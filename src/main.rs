use std::process;

use folio::{
    boot::{boot, BootConfig},
    jobs::handlers::builtin_registry,
};

#[tokio::main]
async fn main() {
    let job_registry = match builtin_registry() {
        Ok(job_registry) => job_registry,
        Err(e) => {
            eprintln!("❌ Failed to register job handlers: {e}");
            process::exit(1);
        }
    };

    boot(BootConfig::new(job_registry)).await;
}
