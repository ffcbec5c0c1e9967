//! ClientHello shaping modes.

/// How the ClientHello is shaped.
///
/// Note: rustls permutes extension order on every connection regardless of
/// the mode, the same way Chrome has since v110. The mode controls the cipher
/// suite and group lists on top of that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum HelloMode {
    /// Random suite order and subset, random group order. Differs per run.
    #[default]
    Randomized,
    /// Chrome 131 suite and group order.
    Chrome,
    /// The TLS stack's defaults, untouched.
    Native,
}

impl HelloMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Randomized => "randomized",
            Self::Chrome => "chrome",
            Self::Native => "native",
        }
    }
}

impl std::fmt::Display for HelloMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
