//! Stable, grep-friendly user-facing output (§1A.1): distinct from the
//! `tracing` diagnostic stream, since scripts may depend on these exact
//! prefixes.

pub fn error(message: &str) {
    println!("[ERROR] {message}");
}

pub fn warning(message: &str) {
    println!("[WARNING] {message}");
}

pub fn autosave(message: &str) {
    println!("[AUTOSAVE] {message}");
}

pub fn banner(message: &str) {
    println!("{message}");
}
