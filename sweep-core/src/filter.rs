//! Selection of repositories from user tokens.
//!
//! Tokens combine literal names, label references and three sigils:
//! exclude (`!`), force-include (`+`) and label (`~`) by default. The final
//! set is `(included ∖ excluded) ∪ forced`, with forced repos bypassing
//! both explicit exclusion and the unwanted-label filter.

use std::collections::HashSet;

use crate::catalog::Catalog;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Include,
    Exclude,
    Force,
}

/// A parsed selection token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub raw: String,
    pub kind: TokenKind,
    pub is_label: bool,
    pub name: String,
}

/// Strip leading sigils and classify. Sigils combine in any order, so
/// `+~backend` force-includes the whole `backend` label.
pub fn parse_token(raw: &str, config: &Config) -> Token {
    let mut kind = TokenKind::Include;
    let mut is_label = false;
    let mut rest = raw;

    loop {
        let Some(c) = rest.chars().next() else { break };
        if c == config.sigil_exclude {
            kind = TokenKind::Exclude;
        } else if c == config.sigil_force {
            kind = TokenKind::Force;
        } else if c == config.sigil_label {
            is_label = true;
        } else {
            break;
        }
        rest = &rest[c.len_utf8()..];
    }

    Token {
        raw: raw.to_string(),
        kind,
        is_label,
        name: rest.to_string(),
    }
}

/// Resolve user tokens to the final ordered repository list.
///
/// Output order is first appearance in the include/force token sequence, or
/// lexicographic when `sort_repos` is set. Unknown names pass through as
/// literals; an empty result is a valid outcome.
pub fn select(catalog: &Catalog, config: &Config, raw_tokens: &[String]) -> Vec<String> {
    let tokens: Vec<Token> = raw_tokens
        .iter()
        .map(|raw| parse_token(raw, config))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut included: HashSet<String> = HashSet::new();
    let mut excluded: HashSet<String> = HashSet::new();
    let mut forced: HashSet<String> = HashSet::new();
    // Repos named directly (not through a label) are exempt from the
    // unwanted-label filter: naming a repo is as deliberate as forcing it.
    let mut literal: HashSet<String> = HashSet::new();

    for token in &tokens {
        let (names, was_label) = expand(catalog, config, token);
        for name in names {
            match token.kind {
                TokenKind::Include => {
                    included.insert(name.clone());
                }
                TokenKind::Exclude => {
                    excluded.insert(name.clone());
                }
                TokenKind::Force => {
                    forced.insert(name.clone());
                }
            }
            if !was_label && token.kind != TokenKind::Exclude {
                literal.insert(name.clone());
            }
            if token.kind != TokenKind::Exclude && seen.insert(name.clone()) {
                order.push(name);
            }
        }
    }

    let mut result: Vec<String> = order
        .into_iter()
        .filter(|name| {
            if forced.contains(name) {
                return true;
            }
            if !included.contains(name) || excluded.contains(name) {
                return false;
            }
            if config.skip_unwanted
                && !literal.contains(name)
                && catalog.has_any_label(name, &config.unwanted_labels)
            {
                return false;
            }
            true
        })
        .collect();

    if config.sort_repos {
        result.sort();
    }
    result
}

/// Expand a token to repo names. Returns the names and whether they came
/// from a label expansion.
///
/// The superset label expands to every known repository. A name that is
/// both a repo and a label resolves to the label only when the label sigil
/// is present; otherwise the literal wins.
fn expand(catalog: &Catalog, config: &Config, token: &Token) -> (Vec<String>, bool) {
    if token.name == config.superset_label {
        return (catalog.names(), true);
    }
    if token.is_label {
        return (catalog.label_members(&token.name), true);
    }
    if catalog.is_label(&token.name) && !catalog.contains(&token.name) {
        return (catalog.label_members(&token.name), true);
    }
    (vec![token.name.clone()], false)
}
