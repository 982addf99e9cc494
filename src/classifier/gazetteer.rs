//! Gazetteer-style entity extraction for known filter dimensions
//!
//! Matches question text against fixed vocabularies of provinces, districts,
//! parties, and gender tokens, plus a constituency-number pattern. Values
//! are returned in their canonical lowercase form, ready to be used as
//! analytics filters or cache-key components.

use regex::Regex;
use std::collections::BTreeMap;

const PROVINCES: &[&str] = &[
    "koshi",
    "madhesh",
    "bagmati",
    "gandaki",
    "lumbini",
    "karnali",
    "sudurpashchim",
];

const DISTRICTS: &[&str] = &[
    "achham",
    "bara",
    "bardia",
    "bhaktapur",
    "chitwan",
    "dang",
    "dhankuta",
    "dolpa",
    "doti",
    "gorkha",
    "gulmi",
    "humla",
    "ilam",
    "jhapa",
    "jumla",
    "kailali",
    "kanchanpur",
    "kaski",
    "kathmandu",
    "khotang",
    "lalitpur",
    "lamjung",
    "morang",
    "mustang",
    "myagdi",
    "nuwakot",
    "palpa",
    "parbat",
    "parsa",
    "pyuthan",
    "ramechhap",
    "rasuwa",
    "rautahat",
    "rolpa",
    "rupandehi",
    "salyan",
    "saptari",
    "siraha",
    "solukhumbu",
    "sunsari",
    "surkhet",
    "syangja",
    "tanahun",
    "taplejung",
    "terhathum",
    "udaypur",
];

/// Party aliases mapped to canonical names
const PARTIES: &[(&str, &str)] = &[
    ("nepali congress", "nepali congress"),
    ("congress", "nepali congress"),
    ("cpn-uml", "cpn-uml"),
    ("uml", "cpn-uml"),
    ("maoist centre", "maoist centre"),
    ("maoist", "maoist centre"),
    ("rsp", "rastriya swatantra party"),
    ("rastriya swatantra", "rastriya swatantra party"),
    ("rpp", "rastriya prajatantra party"),
    ("janata samajbadi", "janata samajbadi party"),
    ("unified socialist", "cpn-unified socialist"),
];

const FEMALE_TOKENS: &[&str] = &["female", "women", "woman"];
const MALE_TOKENS: &[&str] = &["male", "men", "man"];

/// Fixed-vocabulary entity extractor
pub struct Gazetteer {
    constituency: Regex,
    word_boundary_cache: Vec<(String, Regex)>,
}

impl Gazetteer {
    pub fn new() -> Self {
        // Pre-compile one boundary-anchored regex per vocabulary term so
        // extraction stays a linear scan over a fixed set.
        let mut word_boundary_cache = Vec::new();
        for term in PROVINCES
            .iter()
            .chain(DISTRICTS.iter())
            .map(|s| s.to_string())
            .chain(PARTIES.iter().map(|(alias, _)| alias.to_string()))
            .chain(FEMALE_TOKENS.iter().map(|s| s.to_string()))
            .chain(MALE_TOKENS.iter().map(|s| s.to_string()))
        {
            let regex = Regex::new(&format!(r"\b{}\b", regex::escape(&term)))
                .expect("static gazetteer term");
            word_boundary_cache.push((term, regex));
        }

        Self {
            constituency: Regex::new(r"\b(?:constituency|area)\s*(?:no\.?\s*)?(\d+)\b")
                .expect("static pattern"),
            word_boundary_cache,
        }
    }

    fn matches(&self, query: &str, term: &str) -> bool {
        self.word_boundary_cache
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, regex)| regex.is_match(query))
            .unwrap_or(false)
    }

    /// Extract known filter dimensions from a lowercased question
    pub fn extract(&self, query: &str) -> BTreeMap<String, String> {
        let mut entities = BTreeMap::new();

        for province in PROVINCES {
            if self.matches(query, province) {
                entities.insert("province".to_string(), (*province).to_string());
                break;
            }
        }

        for district in DISTRICTS {
            if self.matches(query, district) {
                entities.insert("district".to_string(), (*district).to_string());
                break;
            }
        }

        // Longer aliases are listed first so "nepali congress" wins over
        // the bare "congress" token.
        for (alias, canonical) in PARTIES {
            if self.matches(query, alias) {
                entities.insert("party".to_string(), (*canonical).to_string());
                break;
            }
        }

        if FEMALE_TOKENS.iter().any(|t| self.matches(query, t)) {
            entities.insert("gender".to_string(), "female".to_string());
        } else if MALE_TOKENS.iter().any(|t| self.matches(query, t)) {
            entities.insert("gender".to_string(), "male".to_string());
        }

        if let Some(caps) = self.constituency.captures(query) {
            if let Some(num) = caps.get(1) {
                entities.insert("constituency".to_string(), num.as_str().to_string());
            }
        }

        if query.contains("voting center") || query.contains("polling") {
            entities.insert("target".to_string(), "voting_centers".to_string());
        } else {
            entities.insert("target".to_string(), "candidates".to_string());
        }

        entities
    }

    /// All distinct parties mentioned, canonical form, in vocabulary order
    pub fn parties_in(&self, query: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for (alias, canonical) in PARTIES {
            if self.matches(query, alias) && !found.iter().any(|c| c == canonical) {
                found.push((*canonical).to_string());
            }
        }
        found
    }
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_district_extraction() {
        let g = Gazetteer::new();
        let entities = g.extract("how many candidates in kaski");
        assert_eq!(entities.get("district").map(String::as_str), Some("kaski"));
        assert_eq!(
            entities.get("target").map(String::as_str),
            Some("candidates")
        );
    }

    #[test]
    fn test_province_and_party() {
        let g = Gazetteer::new();
        let entities = g.extract("congress candidates in gandaki");
        assert_eq!(
            entities.get("province").map(String::as_str),
            Some("gandaki")
        );
        assert_eq!(
            entities.get("party").map(String::as_str),
            Some("nepali congress")
        );
    }

    #[test]
    fn test_gender_tokens() {
        let g = Gazetteer::new();
        let entities = g.extract("how many female candidates");
        assert_eq!(entities.get("gender").map(String::as_str), Some("female"));
    }

    #[test]
    fn test_constituency_number() {
        let g = Gazetteer::new();
        let entities = g.extract("candidates in kathmandu constituency 4");
        assert_eq!(entities.get("constituency").map(String::as_str), Some("4"));
        assert_eq!(
            entities.get("district").map(String::as_str),
            Some("kathmandu")
        );
    }

    #[test]
    fn test_voting_center_target() {
        let g = Gazetteer::new();
        let entities = g.extract("how many voting centers in chitwan");
        assert_eq!(
            entities.get("target").map(String::as_str),
            Some("voting_centers")
        );
    }

    #[test]
    fn test_multiple_parties() {
        let g = Gazetteer::new();
        let parties = g.parties_in("compare congress and uml in kaski");
        assert_eq!(parties, vec!["nepali congress", "cpn-uml"]);
    }

    #[test]
    fn test_no_spurious_matches() {
        let g = Gazetteer::new();
        let entities = g.extract("what does the electoral system look like");
        assert!(!entities.contains_key("district"));
        assert!(!entities.contains_key("province"));
        assert!(!entities.contains_key("party"));
    }
}
