/// Display version information
pub fn execute() {
    println!("veilpost {}", env!("CARGO_PKG_VERSION"));
    println!("Anonymous relay and join verification bot for Telegram");
}
