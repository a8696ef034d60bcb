//! Lossy decoding of child output.

use encoding_rs::{Encoding, BIG5, EUC_KR, GBK, SHIFT_JIS, UTF_8};
use tracing::{trace, warn};

/// Decodes raw child output with a fixed encoding.
///
/// Malformed input is replaced with U+FFFD; decoding never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDecoder {
    encoding: &'static Encoding,
}

impl StreamDecoder {
    /// Decoder for the given encoding label.
    ///
    /// Unknown labels fall back to UTF-8.
    pub fn for_label(label: &str) -> Self {
        match lookup(label) {
            Some(encoding) => Self { encoding },
            None => {
                warn!(label = %label, "unsupported output encoding, decoding as UTF-8");
                Self::utf8()
            }
        }
    }

    /// UTF-8 decoder.
    pub fn utf8() -> Self {
        Self { encoding: UTF_8 }
    }

    /// Canonical name of the encoding in use.
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Decode a chunk of output.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, had_errors) = self.encoding.decode_without_bom_handling(bytes);
        if had_errors {
            trace!(encoding = self.name(), "replaced malformed output bytes");
        }
        text.into_owned()
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::utf8()
    }
}

/// Look up an encoding by label, accepting Windows `cpN` names.
fn lookup(label: &str) -> Option<&'static Encoding> {
    let label = label.trim();
    if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
        return Some(encoding);
    }

    let lower = label.to_ascii_lowercase();
    let code_page: u32 = lower
        .strip_prefix("cp")
        .or_else(|| lower.strip_prefix("windows-"))?
        .parse()
        .ok()?;

    match code_page {
        65001 => Some(UTF_8),
        936 => Some(GBK),
        932 => Some(SHIFT_JIS),
        949 => Some(EUC_KR),
        950 => Some(BIG5),
        other => Encoding::for_label(format!("windows-{}", other).as_bytes()),
    }
}
