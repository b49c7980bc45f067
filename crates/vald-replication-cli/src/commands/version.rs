//! Version command implementation.

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    println!("vald-replication {VERSION}");
    println!();
    println!("Replica discovery and recovery for Vald agent clusters.");
    println!();
    println!("Build info:");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
}
