/// A free-text search attached to a recipe. Tokens start unresolved and move
/// to `resolved_tokens` as strategies bind particles to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    phrase: String,
    unresolved_tokens: Vec<String>,
    resolved_tokens: Vec<String>,
}

impl Search {
    pub fn new(phrase: &str) -> Self {
        let phrase = phrase.trim().to_lowercase();
        let unresolved_tokens = tokenize(&phrase);
        Self {
            phrase,
            unresolved_tokens,
            resolved_tokens: Vec::new(),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn unresolved_tokens(&self) -> &[String] {
        &self.unresolved_tokens
    }

    pub fn resolved_tokens(&self) -> &[String] {
        &self.resolved_tokens
    }

    /// Move `token` to the resolved list. Returns `false` if it was not pending.
    pub fn resolve_token(&mut self, token: &str) -> bool {
        match self.unresolved_tokens.iter().position(|t| t == token) {
            Some(i) => {
                let t = self.unresolved_tokens.remove(i);
                self.resolved_tokens.push(t);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.unresolved_tokens.is_empty()
    }

    /// Both token lists together cover exactly the phrase's tokens.
    pub fn is_valid(&self) -> bool {
        let mut all: Vec<&String> = self
            .unresolved_tokens
            .iter()
            .chain(self.resolved_tokens.iter())
            .collect();
        all.sort();
        let expected = tokenize(&self.phrase);
        let mut expected: Vec<&String> = expected.iter().collect();
        expected.sort();
        all == expected
    }

    pub(crate) fn normalize(&mut self) {
        self.unresolved_tokens.sort();
        self.resolved_tokens.sort();
    }

    pub(crate) fn merge(&mut self, other: &Search) {
        self.phrase = format!("{} {}", self.phrase, other.phrase);
        self.unresolved_tokens
            .extend(other.unresolved_tokens.iter().cloned());
        self.resolved_tokens
            .extend(other.resolved_tokens.iter().cloned());
    }
}

fn tokenize(phrase: &str) -> Vec<String> {
    phrase
        .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
