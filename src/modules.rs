/// Turn the raw `--modules` value into the ordered list of modules to load.
///
/// Names may be separated by commas or whitespace. Empty entries and repeats
/// are dropped, keeping the first occurrence.
pub fn verify_modules(requested: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for name in requested.split(|c: char| c == ',' || c.is_whitespace()) {
        if name.is_empty() {
            continue;
        }
        if modules.iter().any(|m| m == name) {
            log::debug!("module {} requested more than once", name);
            continue;
        }
        log::info!("Loading module {} in every task", name);
        modules.push(name.to_string());
    }
    modules
}
