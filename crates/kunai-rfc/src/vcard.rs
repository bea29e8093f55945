//! vCard validation and normalization (RFC 6350).
//!
//! The write pipeline only needs card-level structure: every card must
//! carry VERSION and FN, and FN can be synthesized from N. Text content is
//! otherwise preserved.

use crate::error::{RfcError, RfcResult};
use crate::ical::{Property, fold_line, parse_content_line, unfold};

/// One parsed vCard.
#[derive(Debug, Clone, Default)]
pub struct Card {
    pub properties: Vec<Property>,
}

impl Card {
    /// First property with the given name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All values of a named property; used for query text matching.
    pub fn values_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_str())
    }

    /// ## Summary
    /// Builds a display name from the structured N property:
    /// `Family;Given;Additional;Prefix;Suffix` becomes `Given Family`.
    #[must_use]
    pub fn formatted_name_from_n(&self) -> Option<String> {
        let n = self.property("N")?;
        let mut parts = n.value.split(';');
        let family = parts.next().unwrap_or_default().trim();
        let given = parts.next().unwrap_or_default().trim();
        let name = match (given.is_empty(), family.is_empty()) {
            (false, false) => format!("{given} {family}"),
            (false, true) => given.to_string(),
            (true, false) => family.to_string(),
            (true, true) => return None,
        };
        Some(name)
    }

    fn serialize(&self, out: &mut String) {
        out.push_str("BEGIN:VCARD\r\n");
        for property in &self.properties {
            let mut line = property.name.clone();
            for (pname, pvalue) in &property.params {
                line.push(';');
                line.push_str(pname);
                line.push('=');
                line.push_str(pvalue);
            }
            line.push(':');
            line.push_str(&property.value);
            out.push_str(&fold_line(&line));
            out.push_str("\r\n");
        }
        out.push_str("END:VCARD\r\n");
    }
}

/// ## Summary
/// Parses a payload into its cards.
///
/// ## Errors
/// [`RfcError::InvalidCardData`] when no card is present or BEGIN/END are
/// unbalanced.
pub fn parse_cards(input: &str) -> RfcResult<Vec<Card>> {
    let unfolded = unfold(input);
    let mut cards = Vec::new();
    let mut current: Option<Card> = None;

    for line in unfolded.split("\r\n") {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let property = parse_content_line(line)
            .map_err(|e| RfcError::InvalidCardData(e.to_string()))?;
        match property.name.as_str() {
            "BEGIN" if property.value.eq_ignore_ascii_case("VCARD") => {
                if current.is_some() {
                    return Err(RfcError::InvalidCardData("nested BEGIN:VCARD".to_string()));
                }
                current = Some(Card::default());
            }
            "END" if property.value.eq_ignore_ascii_case("VCARD") => {
                let card = current.take().ok_or_else(|| {
                    RfcError::InvalidCardData("END:VCARD without BEGIN".to_string())
                })?;
                cards.push(card);
            }
            _ => {
                if let Some(card) = current.as_mut() {
                    card.properties.push(property);
                }
            }
        }
    }

    if current.is_some() {
        return Err(RfcError::InvalidCardData("unterminated VCARD".to_string()));
    }
    if cards.is_empty() {
        return Err(RfcError::InvalidCardData("no vCard found".to_string()));
    }
    Ok(cards)
}

/// ## Summary
/// Validates cards and returns the normalized payload: every card must
/// have VERSION, and FN is synthesized from N where missing.
///
/// ## Errors
/// [`RfcError::InvalidCardData`] when VERSION is absent or FN can be
/// neither found nor synthesized.
pub fn validate_and_normalize(input: &str) -> RfcResult<String> {
    let mut cards = parse_cards(input)?;

    for card in &mut cards {
        if card.property("VERSION").is_none() {
            return Err(RfcError::InvalidCardData("vCard missing VERSION".to_string()));
        }
        if card.property("FN").is_none() {
            let synthesized = card.formatted_name_from_n().ok_or_else(|| {
                RfcError::InvalidCardData("vCard missing FN and N".to_string())
            })?;
            card.properties.push(Property::new("FN", synthesized));
        }
    }

    let mut out = String::new();
    for card in &cards {
        card.serialize(&mut out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str =
        "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:card1\r\nFN:Bob Smith\r\nN:Smith;Bob;;;\r\nEND:VCARD\r\n";

    #[test]
    fn parses_and_validates() {
        let normalized = validate_and_normalize(SAMPLE).expect("valid");
        assert!(normalized.contains("FN:Bob Smith\r\n"));
    }

    #[test]
    fn synthesizes_fn_from_n() {
        let input = "BEGIN:VCARD\r\nVERSION:4.0\r\nUID:c\r\nN:Smith;Bob;;;\r\nEND:VCARD\r\n";
        let normalized = validate_and_normalize(input).expect("valid");
        assert!(normalized.contains("FN:Bob Smith\r\n"));
    }

    #[test]
    fn rejects_missing_version_or_name() {
        let no_version = "BEGIN:VCARD\r\nUID:c\r\nFN:X\r\nEND:VCARD\r\n";
        assert!(validate_and_normalize(no_version).is_err());
        let no_name = "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:c\r\nEND:VCARD\r\n";
        assert!(validate_and_normalize(no_name).is_err());
        assert!(validate_and_normalize("").is_err());
    }

    #[test]
    fn multiple_cards_survive_normalization() {
        let two = format!("{SAMPLE}{SAMPLE}");
        let cards = parse_cards(&two).expect("parses");
        assert_eq!(cards.len(), 2);
        let normalized = validate_and_normalize(&two).expect("valid");
        assert_eq!(normalized.matches("BEGIN:VCARD").count(), 2);
    }
}
