// ── ANSI styling ─────────────────────────────────────────────────────────

pub(crate) const RESET: &str = "\x1b[0m";
pub(crate) const BOLD: &str = "\x1b[1m";
pub(crate) const DIM: &str = "\x1b[2m";
pub(crate) const GREEN: &str = "\x1b[32m";
pub(crate) const CYAN: &str = "\x1b[36m";
pub(crate) const RED: &str = "\x1b[31m";

pub(crate) const DASH_LINE: &str = "────────────────────────────────────────────────────────────";

pub(crate) fn header(title: &str) {
    println!();
    println!("  {BOLD}{title}{RESET}");
    println!("  {DIM}{DASH_LINE}{RESET}");
}

pub(crate) fn kv(key: &str, value: &str) {
    println!("  {DIM}{key:<16}{RESET} {value}");
}

pub(crate) fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
