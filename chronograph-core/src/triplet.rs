//! Triplet text generation (GLOSSARY "Triplet text", §11).
//!
//! Builds the human-readable `"{src_name} {humanised_type} {dst_name}"`
//! string used as input to the relationship embedding. Type humanisation is
//! a pure function: `OWNS_EQUITY_IN` -> `"owns equity in"`.

/// `SCREAMING_SNAKE_CASE` -> lowercase words separated by spaces.
pub fn humanise_relationship_type(relationship_type: &str) -> String {
    relationship_type
        .split('_')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn build_triplet_text(src_name: &str, relationship_type: &str, dst_name: &str) -> String {
    format!("{} {} {}", src_name, humanise_relationship_type(relationship_type), dst_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn humanises_screaming_snake_case() {
        assert_eq!(humanise_relationship_type("OWNS_EQUITY_IN"), "owns equity in");
        assert_eq!(humanise_relationship_type("KNOWS"), "knows");
    }

    #[test]
    fn builds_triplet_text() {
        assert_eq!(
            build_triplet_text("Alice", "OWNS_EQUITY_IN", "Acme Corp"),
            "Alice owns equity in Acme Corp"
        );
    }
}
