//! Locale-aware rendering of computed values.

use super::models::Settings;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SymbolPlacement {
    Prefix,
    Suffix,
}

/// Separators and currency layout for one locale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocaleConventions {
    group: &'static str,
    decimal: char,
    placement: SymbolPlacement,
    /// Text between symbol and amount.
    symbol_gap: &'static str,
}

const EN_US: LocaleConventions = LocaleConventions {
    group: ",",
    decimal: '.',
    placement: SymbolPlacement::Prefix,
    symbol_gap: "",
};

impl LocaleConventions {
    /// Conventions for a locale tag; unknown tags fall back by language, then to `en-US`.
    pub fn for_tag(tag: &str) -> Self {
        let normalized = tag.trim().replace('_', "-").to_ascii_lowercase();

        match normalized.as_str() {
            "en-us" | "en-gb" | "en-ca" | "en-au" | "ja-jp" | "zh-cn" => EN_US,
            "de-ch" => LocaleConventions {
                group: "’",
                decimal: '.',
                placement: SymbolPlacement::Prefix,
                symbol_gap: "\u{a0}",
            },
            "de-de" | "de-at" | "es-es" | "it-it" => LocaleConventions {
                group: ".",
                decimal: ',',
                placement: SymbolPlacement::Suffix,
                symbol_gap: "\u{a0}",
            },
            "nl-nl" => LocaleConventions {
                group: ".",
                decimal: ',',
                placement: SymbolPlacement::Prefix,
                symbol_gap: "\u{a0}",
            },
            "pt-br" => LocaleConventions {
                group: ".",
                decimal: ',',
                placement: SymbolPlacement::Prefix,
                symbol_gap: "\u{a0}",
            },
            "fr-fr" | "fr-ca" => LocaleConventions {
                group: "\u{202f}",
                decimal: ',',
                placement: SymbolPlacement::Suffix,
                symbol_gap: "\u{a0}",
            },
            _ => match normalized.split('-').next().unwrap_or_default() {
                "de" => Self::for_tag("de-DE"),
                "es" => Self::for_tag("es-ES"),
                "it" => Self::for_tag("it-IT"),
                "fr" => Self::for_tag("fr-FR"),
                "nl" => Self::for_tag("nl-NL"),
                "pt" => Self::for_tag("pt-BR"),
                _ => EN_US,
            },
        }
    }
}

/// Display symbol for an ISO 4217 code; unknown codes render as the code.
pub fn currency_symbol(code: &str) -> String {
    match code {
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        "INR" => "₹",
        "CNY" => "CN¥",
        "CHF" => "CHF",
        "CAD" => "CA$",
        "AUD" => "A$",
        "BRL" => "R$",
        other => other,
    }
    .to_string()
}

/// Renders numbers with the configured precision and locale.
#[derive(Debug, Clone)]
pub struct NumberFormatter {
    precision: usize,
    conventions: LocaleConventions,
}

impl NumberFormatter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            precision: usize::from(settings.precision.min(Settings::MAX_PRECISION)),
            conventions: LocaleConventions::for_tag(&settings.locale),
        }
    }

    /// Formats `value`, as currency when a code is given.
    ///
    /// Currency output always shows `precision` fraction digits; plain output
    /// shows at most that many, with trailing zeros dropped.
    pub fn format(&self, value: f64, currency: Option<&str>) -> String {
        if !value.is_finite() {
            return if value.is_nan() {
                "NaN".to_string()
            } else if value > 0.0 {
                "∞".to_string()
            } else {
                "-∞".to_string()
            };
        }

        let fixed = format!("{:.*}", self.precision, value.abs());
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (fixed.as_str(), ""),
        };

        let frac_part = match currency {
            Some(_) => frac_part,
            None => frac_part.trim_end_matches('0'),
        };

        let mut amount = self.group_digits(int_part);
        if !frac_part.is_empty() {
            amount.push(self.conventions.decimal);
            amount.push_str(frac_part);
        }

        let is_zero = amount.chars().all(|c| !c.is_ascii_digit() || c == '0');
        let sign = if value < 0.0 && !is_zero { "-" } else { "" };

        match currency {
            None => format!("{}{}", sign, amount),
            Some(code) => {
                let symbol = currency_symbol(code);
                // Codes without a symbol always get a gap.
                let gap = if symbol == code && self.conventions.symbol_gap.is_empty() {
                    "\u{a0}"
                } else {
                    self.conventions.symbol_gap
                };
                match self.conventions.placement {
                    SymbolPlacement::Prefix => format!("{}{}{}{}", sign, symbol, gap, amount),
                    SymbolPlacement::Suffix => format!("{}{}{}{}", sign, amount, gap, symbol),
                }
            }
        }
    }

    fn group_digits(&self, digits: &str) -> String {
        let len = digits.len();
        let mut grouped = String::with_capacity(len + len / 3 * self.conventions.group.len());
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (len - i) % 3 == 0 {
                grouped.push_str(self.conventions.group);
            }
            grouped.push(ch);
        }
        grouped
    }
}

impl Default for NumberFormatter {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}
