use regex::Regex;

/// Extracts a numeric price from free-form element text.
///
/// Bulgarian shops render prices in a mix of notations ("99,90 лв.",
/// "1 234.56 лв.", "€49.99", "$1,299.00"), so the parser tries an ordered
/// list of currency patterns, most specific first, and normalises the
/// captured number before conversion. Parsing fails softly: garbled or
/// missing price text is a routine outcome, not an error.
pub struct PriceParser {
    patterns: Vec<Regex>,
    us_thousands: Regex,
}

impl PriceParser {
    pub fn new() -> Self {
        let patterns = [
            r"(?i)([\d\s,.]+)\s*(?:лв\.?|лева|BGN)", // Bulgarian lev suffix
            r"€\s*([\d\s,.]+)",                      // Euro prefix
            r"([\d\s,.]+)\s*€",                      // Euro suffix
            r"(?i)([\d\s,.]+)\s*EUR",
            r"\$\s*([\d\s,.]+)",            // Dollar prefix
            r"(?i)([\d\s,.]+)\s*(?:USD|\$)", // Dollar suffix
            r"([\d,.]+)",                   // Just numbers as fallback
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect();

        Self {
            patterns,
            us_thousands: Regex::new(r"^\d{1,3}(,\d{3})+(\.\d+)?$").unwrap(),
        }
    }

    /// Parse a price out of `text`, returning `None` when no pattern yields
    /// a convertible number.
    ///
    /// The first matching pattern wins; only its captured numeric group is
    /// processed. A group that fails float conversion falls through to the
    /// next pattern rather than aborting.
    pub fn parse(&self, text: &str) -> Option<f64> {
        let cleaned = text.trim();
        if cleaned.is_empty() {
            return None;
        }

        for pattern in &self.patterns {
            let Some(captures) = pattern.captures(cleaned) else {
                continue;
            };
            let Some(group) = captures.get(1) else {
                continue;
            };

            let compact = group.as_str().replace(' ', "");
            let normalized = self.normalize_separators(&compact);
            if let Ok(price) = normalized.parse::<f64>() {
                return Some(price);
            }
        }

        None
    }

    /// Resolve the comma's role and collapse redundant dots.
    ///
    /// A comma followed by exactly-three-digit groups is treated as a US
    /// thousands separator and dropped; any other comma is a decimal point.
    /// This misreads EU strings like "1,234" (decimal intent) as 1234 -
    /// known and deliberate, kept because real-site behaviour depends on it.
    fn normalize_separators(&self, compact: &str) -> String {
        let mut normalized = if self.us_thousands.is_match(compact) {
            // US format: 1,234.56
            compact.replace(',', "")
        } else {
            // European format: 1.234,56
            compact.replace(',', ".")
        };

        // Handle leftover dot groups like 1.234.56
        let parts: Vec<&str> = normalized.split('.').collect();
        if parts.len() > 2 {
            if let Some((fraction, groups)) = parts.split_last() {
                normalized = format!("{}.{}", groups.concat(), fraction);
            }
        }

        normalized
    }
}

impl Default for PriceParser {
    fn default() -> Self {
        Self::new()
    }
}
