//! Plain-text rendering of grouped search results.

use std::fmt::Write;

use philodb_vector::SchoolCard;

/// `german_idealism` -> `German Idealism`
pub fn display_name(school: &str) -> String {
    school
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn render_card(card: &SchoolCard) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", display_name(&card.school));
    for hit in &card.hits {
        let _ = writeln!(out, "  \"{}\"", hit.passage.text);
        let _ = writeln!(out, "      ({}) — {}  [{:.3}]", hit.passage.title, hit.passage.author, hit.score);
    }
    out
}

pub fn render_cards(cards: &[SchoolCard]) -> String {
    if cards.is_empty() {
        return "No passages above the similarity floor.\n".to_string();
    }
    cards.iter().map(render_card).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use philodb_core::types::Passage;
    use philodb_vector::ScoredPassage;

    #[test]
    fn school_names_are_title_cased() {
        assert_eq!(display_name("german_idealism"), "German Idealism");
        assert_eq!(display_name("stoicism"), "Stoicism");
        assert_eq!(display_name("Unknown"), "Unknown");
        assert_eq!(display_name("__odd__name"), "Odd Name");
    }

    #[test]
    fn card_lists_each_hit() {
        let card = SchoolCard {
            school: "stoicism".to_string(),
            best_score: 0.81234,
            hits: vec![ScoredPassage {
                score: 0.81234,
                index: 0,
                passage: Passage::new("Justice is fairness.", "stoicism", "Meditations", "Marcus Aurelius"),
            }],
        };
        let text = render_card(&card);
        assert!(text.starts_with("== Stoicism ==\n"));
        assert!(text.contains("  \"Justice is fairness.\"\n"));
        assert!(text.contains("(Meditations) — Marcus Aurelius  [0.812]"));
        assert_eq!(render_cards(&[]), "No passages above the similarity floor.\n");
    }
}
