//! Topic Trie for efficient subscription matching
//!
//! A trie (prefix tree) keyed by topic level. Each node has explicit branches
//! for literal levels, the single-level wildcard (+) and the multi-level
//! wildcard (#), so a lookup only visits the branches a topic can reach.
//!
//! Performance optimizations:
//! - Uses iterator-based traversal to avoid Vec allocations on insert
//! - Uses compact_str for memory-efficient topic level storage
//! - Prunes empty branches on removal so long-running brokers do not leak nodes

use ahash::AHashMap;
use compact_str::CompactString;
use smallvec::SmallVec;

/// Node in the topic trie
#[derive(Debug)]
struct TrieNode<V> {
    /// Value stored at this node (filter ends here)
    value: Option<V>,
    /// Children indexed by topic level (CompactString avoids heap allocation for short strings)
    children: AHashMap<CompactString, TrieNode<V>>,
    /// Single-level wildcard (+) child
    single_wildcard: Option<Box<TrieNode<V>>>,
    /// Multi-level wildcard (#) value
    multi_wildcard: Option<V>,
}

impl<V> TrieNode<V> {
    fn new() -> Self {
        Self {
            value: None,
            children: AHashMap::new(),
            single_wildcard: None,
            multi_wildcard: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.multi_wildcard.is_none()
            && self.single_wildcard.is_none()
            && self.children.is_empty()
    }
}

impl<V> Default for TrieNode<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Topic Trie for efficient subscription matching
#[derive(Debug)]
pub struct TopicTrie<V> {
    root: TrieNode<V>,
}

impl<V> TopicTrie<V> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
        }
    }

    /// Locate (creating nodes as needed) the slot a filter's value lives in
    fn slot_mut(&mut self, filter: &str) -> &mut Option<V> {
        let mut node = &mut self.root;

        for level in filter.split('/') {
            match level {
                // Anything after # is rejected by validation
                "#" => return &mut node.multi_wildcard,
                "+" => {
                    node = &mut **node
                        .single_wildcard
                        .get_or_insert_with(|| Box::new(TrieNode::new()));
                }
                _ => {
                    node = node.children.entry(CompactString::new(level)).or_default();
                }
            }
        }

        &mut node.value
    }

    /// Insert a topic filter with associated value, returning the previous value
    pub fn insert(&mut self, filter: &str, value: V) -> Option<V> {
        self.slot_mut(filter).replace(value)
    }

    /// Get the value at a filter, inserting one built by `default` if absent
    pub fn get_or_insert_with<F>(&mut self, filter: &str, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        self.slot_mut(filter).get_or_insert_with(default)
    }

    /// Get a mutable reference to the value at a filter
    pub fn get_mut(&mut self, filter: &str) -> Option<&mut V> {
        let mut node = &mut self.root;

        for level in filter.split('/') {
            match level {
                "#" => return node.multi_wildcard.as_mut(),
                "+" => node = node.single_wildcard.as_deref_mut()?,
                _ => node = node.children.get_mut(level)?,
            }
        }

        node.value.as_mut()
    }

    /// Remove a filter from the trie
    /// Uses SmallVec to avoid heap allocation for typical topic depths (up to 8 levels)
    pub fn remove(&mut self, filter: &str) -> Option<V> {
        let levels: SmallVec<[&str; 8]> = filter.split('/').collect();
        Self::remove_recursive(&mut self.root, &levels)
    }

    fn remove_recursive(node: &mut TrieNode<V>, levels: &[&str]) -> Option<V> {
        let Some((&level, rest)) = levels.split_first() else {
            return node.value.take();
        };

        match level {
            "#" => node.multi_wildcard.take(),
            "+" => {
                let child = node.single_wildcard.as_deref_mut()?;
                let removed = Self::remove_recursive(child, rest);
                if child.is_empty() {
                    node.single_wildcard = None;
                }
                removed
            }
            _ => {
                let child = node.children.get_mut(level)?;
                let removed = Self::remove_recursive(child, rest);
                if child.is_empty() {
                    node.children.remove(level);
                }
                removed
            }
        }
    }

    /// Remove entries by predicate (returns true if entry should be removed)
    pub fn remove_by_predicate<F>(&mut self, mut pred: F)
    where
        F: FnMut(&mut V) -> bool,
    {
        Self::remove_by_predicate_recursive(&mut self.root, &mut pred);
    }

    fn remove_by_predicate_recursive<F>(node: &mut TrieNode<V>, pred: &mut F)
    where
        F: FnMut(&mut V) -> bool,
    {
        if node.value.as_mut().is_some_and(|v| pred(v)) {
            node.value = None;
        }

        if node.multi_wildcard.as_mut().is_some_and(|v| pred(v)) {
            node.multi_wildcard = None;
        }

        if let Some(child) = node.single_wildcard.as_deref_mut() {
            Self::remove_by_predicate_recursive(child, pred);
            if child.is_empty() {
                node.single_wildcard = None;
            }
        }

        node.children.retain(|_, child| {
            Self::remove_by_predicate_recursive(child, pred);
            !child.is_empty()
        });
    }

    /// Visit every stored value
    pub fn for_each<F>(&self, mut callback: F)
    where
        F: FnMut(&V),
    {
        Self::for_each_recursive(&self.root, &mut callback);
    }

    fn for_each_recursive<F>(node: &TrieNode<V>, callback: &mut F)
    where
        F: FnMut(&V),
    {
        if let Some(ref v) = node.value {
            callback(v);
        }
        if let Some(ref v) = node.multi_wildcard {
            callback(v);
        }
        if let Some(ref child) = node.single_wildcard {
            Self::for_each_recursive(child, callback);
        }
        for child in node.children.values() {
            Self::for_each_recursive(child, callback);
        }
    }

    /// Returns true if no filter is stored
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Find all values whose filter matches a topic name
    /// Uses SmallVec to avoid heap allocation for typical topic depths (up to 8 levels)
    pub fn matches<F>(&self, topic: &str, mut callback: F)
    where
        F: FnMut(&V),
    {
        let levels: SmallVec<[&str; 8]> = topic.split('/').collect();
        Self::matches_recursive(&self.root, &levels, &mut callback);
    }

    fn matches_recursive<F>(node: &TrieNode<V>, levels: &[&str], callback: &mut F)
    where
        F: FnMut(&V),
    {
        // # matches the remaining levels, including none
        if let Some(ref v) = node.multi_wildcard {
            callback(v);
        }

        let Some((&level, rest)) = levels.split_first() else {
            if let Some(ref v) = node.value {
                callback(v);
            }
            return;
        };

        if let Some(ref child) = node.single_wildcard {
            Self::matches_recursive(child, rest, callback);
        }

        if let Some(child) = node.children.get(level) {
            Self::matches_recursive(child, rest, callback);
        }
    }
}

impl<V> Default for TopicTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}
