use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Quiet mode: set once from the CLI/config, else from `MUDSTORE_QUIET`
pub fn set_quiet(quiet: bool) {
    let _ = QUIET.set(quiet);
}

pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("MUDSTORE_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}
