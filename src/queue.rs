use std::collections::VecDeque;

/// One piece of text waiting to be synthesized and played.
pub type Utterance = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Utterance queue is empty")]
pub struct EmptyQueue;

/// FIFO of pending utterances. No deduplication or reordering.
#[derive(Clone, Debug, Default)]
pub struct UtteranceQueue {
    items: VecDeque<Utterance>,
}

impl UtteranceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, utterance: impl Into<Utterance>) {
        self.items.push_back(utterance.into());
    }

    pub fn pop_front(&mut self) -> Result<Utterance, EmptyQueue> {
        self.items.pop_front().ok_or(EmptyQueue)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utterance> {
        self.items.iter()
    }
}
