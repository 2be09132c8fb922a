//! Build identification, logged when the controller starts.

const UNDEFINED: &str = "undefined";

/// The version the binary was built with, taken from `NROP_BUILD_VERSION` at compile time.
pub fn get() -> &'static str {
    option_env!("NROP_BUILD_VERSION")
        .filter(|version| !version.is_empty())
        .unwrap_or(UNDEFINED)
}

/// Whether the build carries no version information.
pub fn undefined() -> bool {
    get() == UNDEFINED
}

/// The name the current process was invoked as, without any leading path.
pub fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|arg0| std::path::Path::new(arg0).file_name())
        .and_then(|name| name.to_str())
        .map(String::from)
        .unwrap_or_else(|| crate::constants::CONTROLLER.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_version_is_consistent() {
        assert!(!get().is_empty());
        assert_eq!(undefined(), get() == "undefined");
    }

    #[test]
    fn test_program_name_has_no_path() {
        assert!(!program_name().contains('/'));
    }
}
