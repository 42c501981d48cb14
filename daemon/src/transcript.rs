use std::sync::Mutex;

/// Which collection a piece of text belongs to. Aggregation order is
/// Ocr, then Mic, then UserText.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Ocr,
    Mic,
    UserText,
}

#[derive(Debug, Default)]
struct Buffers {
    ocr: Vec<String>,
    mic: Vec<String>,
    user_text: Vec<String>,
}

/// Append-only accumulator for everything the next prompt will contain.
/// All access goes through one mutex so interleaved captures, mic
/// sessions, and manual additions never tear the aggregate.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    inner: Mutex<Buffers>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trims and appends. Returns false when the trimmed text is empty
    /// and nothing was stored.
    pub fn append(&self, category: Category, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        let mut buffers = self.inner.lock().unwrap();
        let target = match category {
            Category::Ocr => &mut buffers.ocr,
            Category::Mic => &mut buffers.mic,
            Category::UserText => &mut buffers.user_text,
        };
        target.push(trimmed.to_string());
        true
    }

    pub fn clear_all(&self) {
        let mut buffers = self.inner.lock().unwrap();
        buffers.ocr.clear();
        buffers.mic.clear();
        buffers.user_text.clear();
    }

    pub fn is_empty(&self) -> bool {
        let buffers = self.inner.lock().unwrap();
        buffers.ocr.is_empty() && buffers.mic.is_empty() && buffers.user_text.is_empty()
    }

    /// Entry counts as (ocr, mic, user_text).
    pub fn counts(&self) -> (usize, usize, usize) {
        let buffers = self.inner.lock().unwrap();
        (buffers.ocr.len(), buffers.mic.len(), buffers.user_text.len())
    }

    /// Newline-joined view of every entry, in category order. The result
    /// depends only on the stored entries, never on arrival timing across
    /// categories.
    pub fn aggregate(&self) -> String {
        let buffers = self.inner.lock().unwrap();
        let mut parts: Vec<&str> = Vec::with_capacity(
            buffers.ocr.len() + buffers.mic.len() + buffers.user_text.len(),
        );
        parts.extend(buffers.ocr.iter().map(String::as_str));
        parts.extend(buffers.mic.iter().map(String::as_str));
        parts.extend(buffers.user_text.iter().map(String::as_str));
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_trims_and_aggregates_in_order() {
        let store = TranscriptStore::new();
        assert!(store.append(Category::Mic, "  World  "));
        assert!(store.append(Category::Ocr, "Hello"));

        assert_eq!(store.aggregate(), "Hello\nWorld");
    }

    #[test]
    fn test_blank_input_is_dropped() {
        let store = TranscriptStore::new();
        assert!(!store.append(Category::Ocr, "   "));
        assert!(!store.append(Category::UserText, "\t\n"));
        assert!(store.is_empty());
        assert_eq!(store.aggregate(), "");
    }

    #[test]
    fn test_category_order_beats_arrival_order() {
        let store = TranscriptStore::new();
        store.append(Category::UserText, "third");
        store.append(Category::Mic, "second");
        store.append(Category::Ocr, "first");
        store.append(Category::Ocr, "first-b");

        assert_eq!(store.aggregate(), "first\nfirst-b\nsecond\nthird");
    }

    #[test]
    fn test_clear_all_empties_every_category() {
        let store = TranscriptStore::new();
        store.append(Category::Ocr, "a");
        store.append(Category::Mic, "b");
        store.append(Category::UserText, "c");
        assert_eq!(store.counts(), (1, 1, 1));

        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.counts(), (0, 0, 0));
    }

    #[test]
    fn test_concurrent_appends_all_land() {
        let store = Arc::new(TranscriptStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    store.append(Category::Mic, &format!("entry {i}-{j}"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let (_, mic, _) = store.counts();
        assert_eq!(mic, 400);
        assert_eq!(store.aggregate().lines().count(), 400);
    }
}
