//! Platform-aware selection of the child output encoding.
//!
//! All platform branching for output decoding lives here; the rest of the
//! crate only sees an encoding name.

use std::fmt;

use tracing::debug;

/// Environment variable that forces the decode encoding.
pub const ENCODING_OVERRIDE_VAR: &str = "SHELL_RUNNER_ENCODING";

/// Encoding used when nothing else gives a signal.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Windows code page identifier for UTF-8.
const UTF8_CODE_PAGE: u32 = 65001;

/// Terminals that run their sessions in UTF-8 by default.
const UTF8_TERMINAL_VARS: [&str; 2] = ["WT_SESSION", "ConEmuPID"];

/// Locale variables in POSIX precedence order.
const LOCALE_VARS: [&str; 3] = ["LC_ALL", "LC_CTYPE", "LANG"];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;
type CodePageProbe = Box<dyn Fn() -> Option<u32> + Send + Sync>;

/// Platform family, as far as encoding resolution cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Resolves the encoding used to decode a child's byte streams.
///
/// Resolution order, highest priority first:
/// 1. [`ENCODING_OVERRIDE_VAR`], returned verbatim.
/// 2. Windows: a UTF-8 terminal session (`WT_SESSION`, `ConEmuPID`).
/// 3. Windows: an active console code page of 65001.
/// 4. The locale codeset (`LC_ALL`, `LC_CTYPE`, `LANG`), or on Windows
///    the probed console code page as `cpN`.
/// 5. [`DEFAULT_ENCODING`].
pub struct EncodingResolver {
    platform: Platform,
    env: EnvLookup,
    probe: CodePageProbe,
}

impl EncodingResolver {
    /// Resolver backed by the real process environment.
    pub fn system() -> Self {
        Self {
            platform: Platform::current(),
            env: Box::new(|key| std::env::var(key).ok()),
            probe: Box::new(probe_console_code_page),
        }
    }

    /// Override the platform family.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Override the environment lookup.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(env);
        self
    }

    /// Override the console code page probe.
    pub fn with_code_page_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> Option<u32> + Send + Sync + 'static,
    {
        self.probe = Box::new(probe);
        self
    }

    /// Resolve the encoding name. Never fails.
    pub fn resolve(&self) -> String {
        if let Some(name) = (self.env)(ENCODING_OVERRIDE_VAR).filter(|v| !v.is_empty()) {
            debug!(encoding = %name, "encoding forced by {}", ENCODING_OVERRIDE_VAR);
            return name;
        }

        let mut console_code_page = None;
        if self.platform == Platform::Windows {
            if UTF8_TERMINAL_VARS.iter().any(|var| (self.env)(var).is_some()) {
                return DEFAULT_ENCODING.to_string();
            }

            console_code_page = (self.probe)();
            if console_code_page == Some(UTF8_CODE_PAGE) {
                return DEFAULT_ENCODING.to_string();
            }
        }

        if let Some(codeset) = self.locale_codeset() {
            return codeset;
        }

        if let Some(code_page) = console_code_page {
            return format!("cp{}", code_page);
        }

        DEFAULT_ENCODING.to_string()
    }

    /// Codeset of the effective locale, if it names one.
    fn locale_codeset(&self) -> Option<String> {
        LOCALE_VARS
            .iter()
            .find_map(|var| (self.env)(var).filter(|v| !v.is_empty()))
            .and_then(|locale| codeset_from_locale(&locale))
    }
}

impl Default for EncodingResolver {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for EncodingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingResolver")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

/// Resolve the decode encoding from the real environment.
pub fn resolve_encoding() -> String {
    EncodingResolver::system().resolve()
}

/// Extract the codeset from a locale name such as `en_US.UTF-8@euro`.
///
/// `C`, `POSIX` and locales without a codeset give `None`.
pub fn codeset_from_locale(locale: &str) -> Option<String> {
    let without_modifier = locale.split('@').next().unwrap_or(locale);
    let (_, codeset) = without_modifier.split_once('.')?;
    let codeset = codeset.trim();
    if codeset.is_empty() {
        None
    } else {
        Some(codeset.to_string())
    }
}

/// Parse the code page out of `chcp` output.
///
/// The message text is localized, so only the trailing number is used.
pub fn code_page_from_chcp(output: &str) -> Option<u32> {
    output
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .last()
        .and_then(|digits| digits.parse().ok())
}

#[cfg(windows)]
fn probe_console_code_page() -> Option<u32> {
    match std::process::Command::new("cmd").args(["/C", "chcp"]).output() {
        Ok(output) => code_page_from_chcp(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            debug!(error = %e, "console code page probe failed");
            None
        }
    }
}

#[cfg(not(windows))]
fn probe_console_code_page() -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn resolver(platform: Platform, vars: &[(&str, &str)]) -> EncodingResolver {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EncodingResolver::system()
            .with_platform(platform)
            .with_env(move |key| vars.get(key).cloned())
            .with_code_page_probe(|| None)
    }

    #[test]
    fn test_override_wins_verbatim() {
        let r = resolver(
            Platform::Windows,
            &[(ENCODING_OVERRIDE_VAR, "Shift_JIS"), ("WT_SESSION", "1")],
        );
        assert_eq!(r.resolve(), "Shift_JIS");
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let r = resolver(Platform::Unix, &[(ENCODING_OVERRIDE_VAR, "")]);
        assert_eq!(r.resolve(), DEFAULT_ENCODING);
    }

    #[test]
    fn test_windows_terminal_is_utf8() {
        let r = resolver(Platform::Windows, &[("WT_SESSION", "abc"), ("LANG", "ja_JP.SJIS")]);
        assert_eq!(r.resolve(), "utf-8");

        let r = resolver(Platform::Windows, &[("ConEmuPID", "42")]);
        assert_eq!(r.resolve(), "utf-8");
    }

    #[test]
    fn test_terminal_vars_ignored_off_windows() {
        let r = resolver(Platform::Unix, &[("WT_SESSION", "abc"), ("LANG", "de_DE.ISO-8859-1")]);
        assert_eq!(r.resolve(), "ISO-8859-1");
    }

    #[test]
    fn test_windows_utf8_code_page() {
        let r = resolver(Platform::Windows, &[("LANG", "zh_CN.GBK")])
            .with_code_page_probe(|| Some(65001));
        assert_eq!(r.resolve(), "utf-8");
    }

    #[test]
    fn test_windows_other_code_page_falls_to_locale_then_code_page() {
        let r = resolver(Platform::Windows, &[]).with_code_page_probe(|| Some(936));
        assert_eq!(r.resolve(), "cp936");

        let r = resolver(Platform::Windows, &[("LC_ALL", "zh_CN.GB18030")])
            .with_code_page_probe(|| Some(936));
        assert_eq!(r.resolve(), "GB18030");
    }

    #[test]
    fn test_probe_not_called_off_windows() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let r = resolver(Platform::Unix, &[]).with_code_page_probe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(936)
        });
        assert_eq!(r.resolve(), DEFAULT_ENCODING);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_locale_precedence() {
        let r = resolver(
            Platform::Unix,
            &[("LC_ALL", "ja_JP.eucJP"), ("LANG", "en_US.UTF-8")],
        );
        assert_eq!(r.resolve(), "eucJP");

        let r = resolver(Platform::Unix, &[("LC_ALL", ""), ("LC_CTYPE", "ko_KR.EUC-KR")]);
        assert_eq!(r.resolve(), "EUC-KR");
    }

    #[test]
    fn test_c_locale_falls_back() {
        let r = resolver(Platform::Unix, &[("LANG", "C")]);
        assert_eq!(r.resolve(), DEFAULT_ENCODING);
    }

    #[test]
    fn test_codeset_from_locale() {
        assert_eq!(codeset_from_locale("en_US.UTF-8"), Some("UTF-8".into()));
        assert_eq!(codeset_from_locale("de_DE.ISO-8859-15@euro"), Some("ISO-8859-15".into()));
        assert_eq!(codeset_from_locale("POSIX"), None);
        assert_eq!(codeset_from_locale("en_US"), None);
        assert_eq!(codeset_from_locale("en_US."), None);
    }

    #[test]
    fn test_code_page_from_chcp() {
        assert_eq!(code_page_from_chcp("Active code page: 65001\r\n"), Some(65001));
        assert_eq!(code_page_from_chcp("活动代码页: 936"), Some(936));
        assert_eq!(code_page_from_chcp("no number here"), None);
        assert_eq!(code_page_from_chcp(""), None);
    }

    #[test]
    fn test_system_resolver_never_empty() {
        assert!(!resolve_encoding().is_empty());
    }
}
