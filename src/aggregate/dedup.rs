use std::collections::HashSet;

use crate::models::{ContentItem, SourceId};

/// Identity keys already placed in a response; first occurrence wins
#[derive(Debug, Default)]
pub struct IdentitySet {
    seen: HashSet<(SourceId, String)>,
}

impl IdentitySet {
    /// `true` if the item was not seen before
    pub fn admit(&mut self, item: &ContentItem) -> bool {
        let (source, id) = item.identity();
        self.seen.insert((source, id.to_string()))
    }

    /// Drop items already admitted, admitting the rest
    pub fn retain_unseen(&mut self, items: Vec<ContentItem>) -> Vec<ContentItem> {
        items.into_iter().filter(|item| self.admit(item)).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_includes_the_source() {
        let mut seen = IdentitySet::default();
        let kept = seen.retain_unseen(vec![
            ContentItem::new(SourceId::Dramabox, "1", "a"),
            ContentItem::new(SourceId::Netshort, "1", "b"),
            ContentItem::new(SourceId::Dramabox, "1", "c"),
        ]);

        let titles: Vec<&str> = kept.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(seen.len(), 2);
    }
}
