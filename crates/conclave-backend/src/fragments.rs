use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The content produced by one backend call, kept as the sequence of
/// fragments it was delivered in (one fragment for a non-streaming call,
/// one per chunk for a streamed one).
///
/// The sequence is finite and restartable: [`iter`](Self::iter) can be
/// called any number of times and always replays from the first fragment.
/// Serializes as the concatenated text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFragments {
    parts: Vec<String>,
}

impl ContentFragments {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![text.into()],
        }
    }

    pub fn push(&mut self, fragment: impl Into<String>) {
        self.parts.push(fragment.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.parts.iter().map(String::as_str)
    }

    pub fn fragment_count(&self) -> usize {
        self.parts.len()
    }

    /// True when there is no non-empty fragment.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(String::is_empty)
    }

    pub fn to_text(&self) -> String {
        self.parts.concat()
    }
}

impl fmt::Display for ContentFragments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl FromIterator<String> for ContentFragments {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

impl From<String> for ContentFragments {
    fn from(text: String) -> Self {
        Self::from_text(text)
    }
}

impl From<&str> for ContentFragments {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl Serialize for ContentFragments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for ContentFragments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::from_text(text))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn iteration_restarts() {
        let frags: ContentFragments = vec!["Hel".to_string(), "lo".to_string()].into_iter().collect();
        let first: Vec<&str> = frags.iter().collect();
        let second: Vec<&str> = frags.iter().collect();
        assert_eq!(first, second);
        assert_eq!(frags.to_text(), "Hello");
        assert_eq!(frags.to_string(), "Hello");
    }

    #[test]
    fn empty_detection() {
        assert!(ContentFragments::default().is_empty());
        assert!(ContentFragments::new(vec![String::new()]).is_empty());
        assert!(!ContentFragments::from_text("x").is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let frags = ContentFragments::new(vec!["dx: ".into(), "flu".into()]);
        assert_eq!(serde_json::to_string(&frags).unwrap(), "\"dx: flu\"");
        let back: ContentFragments = serde_json::from_str("\"dx: flu\"").unwrap();
        assert_eq!(back.to_text(), "dx: flu");
    }
}
