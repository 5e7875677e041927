//! Shared result alias for infrastructure failures.
//!
//! Store and transport collaborators report failures as rootcause reports so
//! that the caller can attach the step it was performing with `.context()`.
//! The authentication chain itself never returns a report to the browser: the
//! callback router logs the report and maps it to a user-facing error code.

use rootcause::Report;

/// Result carrying a rootcause [`Report`] with context type `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Unavailable;

    impl fmt::Display for Unavailable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "store unavailable")
        }
    }

    impl std::error::Error for Unavailable {}

    fn lookup(found: bool) -> Result<u32, Unavailable> {
        if found { Ok(7) } else { Err(Unavailable.into()) }
    }

    #[test]
    fn ok_values_pass_through() {
        assert_eq!(lookup(true).expect("found"), 7);
    }

    #[test]
    fn errors_render_their_context() {
        let report = lookup(false).expect_err("missing");
        assert!(report.to_string().contains("store unavailable"));
    }
}
