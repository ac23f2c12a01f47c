//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `taskdeck_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    match taskdeck_core::db::open_db_in_memory() {
        Ok(_conn) => println!("taskdeck_core store=ok"),
        Err(err) => {
            eprintln!("taskdeck_core store=error {err}");
            std::process::exit(1);
        }
    }
    println!("taskdeck_core version={}", taskdeck_core::core_version());
    println!(
        "taskdeck_core schema_version={}",
        taskdeck_core::db::migrations::latest_version()
    );
}
