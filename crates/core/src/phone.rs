//! Phone number canonicalization.
//!
//! The campaign platform, the carrier and the contact lists all spell the
//! same number differently (`+91 98765 43210`, `09876543210`,
//! `919876543210`). [`PhoneNormalizer::normalize`] maps every spelling to
//! one canonical key and [`PhoneNormalizer::variants_of`] enumerates the
//! spellings worth querying when a system stores numbers verbatim.

/// Default country calling code (India).
pub const DEFAULT_COUNTRY_CODE: &str = "91";

/// Default length of a national subscriber number.
pub const DEFAULT_NATIONAL_LENGTH: usize = 10;

/// Canonicalizes phone numbers for one configured country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
    national_length: usize,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            national_length: DEFAULT_NATIONAL_LENGTH,
        }
    }
}

impl PhoneNormalizer {
    /// Create a normalizer for a country code such as `"91"` or `"+44"`.
    ///
    /// Non-digits and leading zeros are dropped from `country_code`; a code
    /// that ends up empty disables country-code stripping.
    pub fn new(country_code: &str, national_length: usize) -> Self {
        let digits: String = country_code.chars().filter(char::is_ascii_digit).collect();
        Self {
            country_code: digits.trim_start_matches('0').to_string(),
            national_length,
        }
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn national_length(&self) -> usize {
        self.national_length
    }

    /// Canonical key for `raw`: digits only, without the international
    /// `00` / trunk `0` prefix and without the configured country code.
    ///
    /// Never fails; input without digits yields an empty string. The
    /// country code is only removed when what remains is exactly one
    /// national number, so national numbers that happen to start with the
    /// country code's digits are left intact and the function is idempotent.
    ///
    /// ```
    /// use callsync_core::phone::PhoneNormalizer;
    ///
    /// let n = PhoneNormalizer::default();
    /// assert_eq!(n.normalize("+91 98765-43210"), "9876543210");
    /// assert_eq!(n.normalize("098765 43210"), "9876543210");
    /// assert_eq!(n.normalize("n/a"), "");
    /// ```
    pub fn normalize(&self, raw: &str) -> String {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        let trimmed = digits.trim_start_matches('0');

        if !self.country_code.is_empty() {
            if let Some(rest) = trimmed.strip_prefix(self.country_code.as_str()) {
                let rest = rest.trim_start_matches('0');
                if rest.len() == self.national_length {
                    return rest.to_string();
                }
            }
        }

        trimmed.to_string()
    }

    /// Spellings of `raw` that other systems may have stored.
    ///
    /// Contains, in order and without duplicates: the canonical form, the
    /// canonical form with a trunk zero, the country-prefixed forms (with
    /// and without `+`) when the canonical form is a full national number,
    /// and `raw` verbatim. Every variant normalizes back to
    /// `normalize(raw)`.
    pub fn variants_of(&self, raw: &str) -> Vec<String> {
        let canonical = self.normalize(raw);
        let mut variants: Vec<String> = Vec::with_capacity(5);

        if !canonical.is_empty() {
            variants.push(canonical.clone());
            variants.push(format!("0{canonical}"));
            if let Some(prefixed) = self.with_country_code(&canonical) {
                variants.push(prefixed.clone());
                variants.push(format!("+{prefixed}"));
            }
        }

        let verbatim = raw.trim();
        if !verbatim.is_empty() && !variants.iter().any(|v| v == verbatim) {
            variants.push(verbatim.to_string());
        }

        variants
    }

    /// E.164 spelling (`+<cc><national>`) when `raw` is a full national
    /// number, otherwise the canonical form.
    pub fn e164(&self, raw: &str) -> String {
        let canonical = self.normalize(raw);
        match self.with_country_code(&canonical) {
            Some(prefixed) => format!("+{prefixed}"),
            None => canonical,
        }
    }

    /// Trunk-prefixed national spelling (`0<national>`), the format the
    /// carrier expects in its From/To filters.
    pub fn trunk_form(&self, raw: &str) -> String {
        let canonical = self.normalize(raw);
        if canonical.is_empty() {
            return canonical;
        }
        format!("0{canonical}")
    }

    /// Whether two spellings refer to the same number. Empty keys never match.
    pub fn same_number(&self, a: &str, b: &str) -> bool {
        let a = self.normalize(a);
        !a.is_empty() && a == self.normalize(b)
    }

    fn with_country_code(&self, canonical: &str) -> Option<String> {
        if self.country_code.is_empty() || canonical.len() != self.national_length {
            return None;
        }
        Some(format!("{}{canonical}", self.country_code))
    }
}
