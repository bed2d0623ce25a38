use std::collections::HashSet;
use std::path::Path;

use error_stack::{Report, ResultExt};

use crate::error::WatchlistError;

/// Exchange-qualified ticker for the data provider.
///
/// Bare numeric codes are BSE scrips (`.BO`); everything else defaults to NSE
/// (`.NS`). Symbols that already carry either suffix are only upper-cased.
pub fn normalize_symbol(raw: &str) -> String {
    let symbol = raw.trim().to_uppercase();
    if symbol.ends_with(".NS") || symbol.ends_with(".BO") {
        return symbol;
    }
    if !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_digit()) {
        format!("{symbol}.BO")
    } else {
        format!("{symbol}.NS")
    }
}

/// Ordered, duplicate-free set of symbols eligible for scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    symbols: Vec<String>,
}

impl Watchlist {
    /// Parse one symbol per line; blank lines and `#` comments are ignored.
    pub fn parse(content: &str) -> Self {
        let mut seen = HashSet::new();
        let symbols = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .filter(|line| !line.is_empty())
            .map(normalize_symbol)
            .filter(|symbol| seen.insert(symbol.clone()))
            .collect();
        Self { symbols }
    }

    pub fn load(path: &Path) -> Result<Self, Report<WatchlistError>> {
        let content = std::fs::read_to_string(path)
            .change_context(WatchlistError::ReadFile)
            .attach_with(|| format!("path: {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
impl Watchlist {
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let content: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_owned()).collect();
        Self::parse(&content.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_added_by_symbol_kind() {
        assert_eq!(normalize_symbol("reliance"), "RELIANCE.NS");
        assert_eq!(normalize_symbol(" 500325 "), "500325.BO");
        assert_eq!(normalize_symbol("TCS.NS"), "TCS.NS");
        assert_eq!(normalize_symbol("infy.bo"), "INFY.BO");
    }

    #[test]
    fn parse_skips_blanks_and_comments_and_dedups_in_order() {
        let list = Watchlist::parse("TCS\n\n# banks\nHDFCBANK  # private\ntcs.ns\nINFY\n");
        assert_eq!(list.symbols(), &["TCS.NS", "HDFCBANK.NS", "INFY.NS"]);
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(Watchlist::load(Path::new("/nonexistent/stocks.txt")).is_err());
    }

    #[test]
    fn from_symbols_normalizes() {
        let list = Watchlist::from_symbols(["A", "B", "A"]);
        assert_eq!(list.len(), 2);
    }
}
